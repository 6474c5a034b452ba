//! 分页相关的数据结构

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::SubscriptionResponse;

pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaginationParams {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self { page, per_page }
    }

    pub fn get_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn get_per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn get_offset(&self) -> u64 {
        (self.get_page() as u64 - 1) * self.get_per_page() as u64
    }

    pub fn get_limit(&self) -> u64 {
        self.get_per_page() as u64
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[aliases(SubscriptionPage = PaginatedResponse<SubscriptionResponse>)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, params: &PaginationParams, total: u64) -> Self {
        let per_page = params.get_per_page();
        Self {
            items,
            page: params.get_page(),
            per_page,
            total,
            total_pages: total.div_ceil(per_page as u64),
        }
    }
}
