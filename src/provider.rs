use crate::{
    Context, KubeStore, Result, Settings,
    resources::bucket::{self, Bucket, BucketResource},
};
use std::sync::Arc;

/// Provider type name, prefixes every resource type
pub static TYPE_NAME: &str = "acme";

/// Provider version
pub static VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resource types implemented by the provider
pub fn resource_types() -> Vec<String> {
    vec![format!("{TYPE_NAME}{}", bucket::TYPE_SUFFIX)]
}

/// Configured provider, holding one handle per resource type
pub struct Provider {
    bucket: BucketResource<KubeStore<Bucket>>,
}

impl Provider {
    pub async fn configure(settings: &Settings) -> Result<Provider> {
        let context = Arc::new(Context::configure(settings).await?);
        Ok(Provider {
            bucket: BucketResource::new(context),
        })
    }

    pub fn bucket(&self) -> &BucketResource<KubeStore<Bucket>> {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_names() {
        assert_eq!(resource_types(), vec!["acme_bucket".to_string()]);
    }
}
