pub mod api;
pub mod cache;
pub mod client;
pub mod ent;
pub mod error;
pub mod feed;
pub mod list;
pub mod logger;
pub mod modal;
pub mod notify;
pub mod revalidate;
pub mod subscription;
pub use cache::{ActiveQuery, QueryCache, QueryData, QueryKey, QueryRoot};
pub use client::QueryClient;
pub use ent::*;
pub use error::{ApiError, ApiResult, StateError};
pub use feed::{HistoryFeed, Sentinel};
pub use list::{ListRender, ListState, ServiceListView};
pub use logger::{Logger, QueryEvent};
pub use modal::{ModalState, ModalStore, Mode, ServiceForm};
pub use notify::{Toast, ToastLevel, Toaster};
pub use revalidate::Revalidator;
