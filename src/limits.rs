/// Tenant lock table capacity. Locks are never removed once created.
pub const MAX_TENANTS: usize = 100_000;

pub const RANKING_PAGE_SIZE: usize = 100;
pub const TENANT_BILLING_PAGE_SIZE: usize = 10;

pub const MAX_UPLOAD_ROWS: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;

pub const PLAYER_YEN: i64 = 100;
pub const VISITOR_YEN: i64 = 10;

pub const VISIT_BUFFER_CAPACITY: usize = 100;
