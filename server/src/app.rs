use std::ops::Deref;
use std::sync::Arc;

use meridian_store::Store;

use crate::args::CascadeArgs;

pub struct AppInner {
    pub store: Arc<Store>,
    pub cascade_max_concurrency: usize,
    pub secret_encryption_password: String,
}

#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl Deref for App {
    type Target = AppInner;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl App {
    pub fn new(store: Arc<Store>, cascade: &CascadeArgs, secret_encryption_password: String) -> Self {
        Self {
            inner: Arc::new(AppInner {
                store,
                cascade_max_concurrency: cascade.max_concurrency(),
                secret_encryption_password,
            }),
        }
    }
}
