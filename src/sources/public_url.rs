/// Generic public URL source. No OAuth, nothing to list.
use async_trait::async_trait;

use super::DataSource;

/// Service name recorded on URL imports.
pub const SERVICE_NAME: &str = "generic";

pub struct PublicUrl;

#[async_trait]
impl DataSource for PublicUrl {
    fn name(&self) -> &str {
        SERVICE_NAME
    }
}
