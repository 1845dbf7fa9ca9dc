//! Plugins compiled into this build.

pub mod orders;

use std::sync::Arc;

use plughost_runtime::PluginCatalog;

pub fn catalog() -> PluginCatalog {
    PluginCatalog::new().with(orders::CODE, || Arc::new(orders::Orders))
}
