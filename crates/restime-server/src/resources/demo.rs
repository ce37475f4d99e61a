use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::Path,
    http::{Method, StatusCode},
    response::Response,
    Extension, Json,
};
use thiserror::Error;

use restime_core::{arg, HandlerFailure, MetricTag, TimedResource};

use crate::error::ApiError;
use crate::modules::{Binder, ServerModule};
use crate::resources::store::{ItemStore, ItemStoreError, NewItem};
use crate::timed::Timed;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Demo module: an echo resource and an in-memory item collection.
#[derive(Debug, Clone)]
pub struct DemoModule {
    pub capacity: usize,
}

impl Default for DemoModule {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY }
    }
}

impl DemoModule {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl ServerModule for DemoModule {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn configure(&self, binder: &mut Binder) {
        binder
            .provide(Arc::new(ItemStore::new(self.capacity)))
            .map_error_status::<ItemStoreError>(StatusCode::SERVICE_UNAVAILABLE)
            .timed(
                TimedResource::new(Method::GET, "/v1/echo/:word", "echo").tagged(MetricTag::raw("word")),
                echo,
            )
            .timed(
                TimedResource::new(Method::POST, "/v1/items", "create_item")
                    .untagged()
                    .tagged(MetricTag::new("owner", "ownerId")),
                create_item,
            )
            .timed(TimedResource::new(Method::GET, "/v1/items/:id", "get_item"), get_item)
            .timed(TimedResource::new(Method::DELETE, "/v1/items/:id", "delete_item"), delete_item);
    }
}

/// Failures of `create_item`.
#[derive(Debug, Error)]
pub enum ItemsError {
    #[error("invalid item: {0}")]
    Invalid(String),

    #[error("cannot store item")]
    Store(#[from] ItemStoreError),
}

impl HandlerFailure for ItemsError {
    fn carried_status(&self) -> Option<u16> {
        match self {
            ItemsError::Invalid(_) => Some(400),
            // answered by the mapper bound for the source
            ItemsError::Store(_) => None,
        }
    }
}

async fn echo(timed: Timed, Path(word): Path<String>) -> Response {
    timed
        .respond_async(&[arg(&word)], async { Ok::<_, Infallible>(word.clone()) })
        .await
}

async fn create_item(
    timed: Timed,
    Extension(store): Extension<Arc<ItemStore>>,
    Json(body): Json<NewItem>,
) -> Response {
    timed.respond(&[None, arg(&body)], || {
        if body.name.trim().is_empty() {
            return Err(ItemsError::Invalid("name must not be blank".into()));
        }
        let item = store.insert(&body)?;
        tracing::debug!(id = item.id, owner = item.owner_id, "item created");
        Ok((StatusCode::CREATED, Json(item)))
    })
}

async fn get_item(
    timed: Timed,
    Extension(store): Extension<Arc<ItemStore>>,
    Path(id): Path<u64>,
) -> Response {
    timed.respond(&[], || {
        store
            .get(id)
            .map(Json)
            .ok_or_else(|| ApiError::NotFound(format!("item {id}")))
    })
}

async fn delete_item(
    timed: Timed,
    Extension(store): Extension<Arc<ItemStore>>,
    Path(id): Path<u64>,
) -> Response {
    timed.respond(&[], || {
        store
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("item {id}")))
    })
}
