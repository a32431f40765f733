//! Process-wide access to a [`Views`] instance.
//!
//! Prefer passing `Views` (or `Arc<Views>`) explicitly. The facade exists for
//! call sites that cannot receive it, such as callbacks registered with third
//! party code.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use standout_views::{facade, Views, ViewData};
//!
//! facade::set_instance(Arc::new(Views::new("views", "cache")?));
//! let page = facade::view("home", ViewData::new(), ViewData::new())?.render()?;
//! # Ok::<(), standout_views::ViewError>(())
//! ```

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::ViewError;
use crate::view::View;
use crate::views::Views;
use crate::ViewData;

static INSTANCE: Lazy<RwLock<Option<Arc<Views>>>> = Lazy::new(|| RwLock::new(None));

/// Installs `views` as the global instance, replacing any previous one.
pub fn set_instance(views: Arc<Views>) {
    debug!("global views instance set");
    *INSTANCE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(views);
}

/// The global instance, if one was set.
pub fn instance() -> Option<Arc<Views>> {
    INSTANCE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Removes the global instance and returns it.
pub fn clear_instance() -> Option<Arc<Views>> {
    INSTANCE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

/// Creates a view through the global instance.
///
/// # Errors
///
/// [`ViewError::Uninitialized`] if [`set_instance`] has not been called.
pub fn view(name: &str, data: ViewData, merge_data: ViewData) -> Result<View, ViewError> {
    instance()
        .ok_or(ViewError::Uninitialized)?
        .view(name, data, merge_data)
}
