mod health;
mod proxy;

pub use health::{health_check, stats};
pub use proxy::{PROXY_PREFIX, method_not_allowed, proxy};
