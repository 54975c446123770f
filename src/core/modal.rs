//! The add/edit dialog: one shared store, and the form that reads it.

use crate::core::client::QueryClient;
use crate::core::ent::*;
use crate::core::error::{ApiResult, StateError};
use crate::core::notify::Toaster;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Add,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModalState {
    pub is_open: bool,
    pub mode: Mode,
    pub initial_data: Option<Service>,
}

/// Handle to the dialog state. Clones share one dialog; `open` and `close`
/// are the only writers.
#[derive(Debug, Clone)]
pub struct ModalStore {
    tx: Arc<watch::Sender<ModalState>>,
}

impl Default for ModalStore {
    fn default() -> Self {
        ModalStore::new()
    }
}

impl ModalStore {
    pub fn new() -> ModalStore {
        let (tx, _) = watch::channel(ModalState::default());
        ModalStore { tx: Arc::new(tx) }
    }

    /// Edit mode needs a record with an id; add mode never keeps one.
    pub fn open(&self, mode: Mode, data: Option<Service>) -> Result<(), StateError> {
        let initial_data = match mode {
            Mode::Edit => {
                let service = data.ok_or(StateError::MissingRecord)?;
                if service.id.is_empty() {
                    return Err(StateError::MissingId);
                }
                Some(service)
            }
            Mode::Add => {
                if data.is_some() {
                    tracing::debug!("ignoring initial data for add dialog");
                }
                None
            }
        };
        self.tx.send_replace(ModalState {
            is_open: true,
            mode,
            initial_data,
        });
        Ok(())
    }

    pub fn close(&self) {
        self.tx.send_replace(ModalState::default());
    }

    pub fn snapshot(&self) -> ModalState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModalState> {
        self.tx.subscribe()
    }
}

/// Editable fields of the dialog, re-seeded whenever the store changes.
#[derive(Debug)]
pub struct ServiceForm {
    modal: ModalStore,
    rx: watch::Receiver<ModalState>,
    pub name: String,
    pub service_type: Option<ServiceType>,
}

impl ServiceForm {
    pub fn new(modal: ModalStore) -> ServiceForm {
        let mut rx = modal.subscribe();
        let state = rx.borrow_and_update().clone();
        let mut form = ServiceForm {
            modal,
            rx,
            name: String::new(),
            service_type: None,
        };
        form.seed(&state);
        form
    }

    fn seed(&mut self, state: &ModalState) {
        match (&state.mode, &state.initial_data) {
            (Mode::Edit, Some(service)) => {
                self.name = service.name.clone();
                self.service_type = Some(service.service_type);
            }
            _ => {
                self.name.clear();
                self.service_type = None;
            }
        }
    }

    /// Picks up store changes. Returns true if the fields were re-seeded.
    pub fn sync(&mut self) -> bool {
        if !self.rx.has_changed().unwrap_or(false) {
            return false;
        }
        let state = self.rx.borrow_and_update().clone();
        self.seed(&state);
        true
    }

    /// Edits land on a form seeded from the dialog as it is now.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.sync();
        self.name = name.into();
    }

    pub fn set_service_type(&mut self, service_type: ServiceType) {
        self.sync();
        self.service_type = Some(service_type);
    }

    /// Sends the fields as entered. Updates in edit mode, creates otherwise.
    /// Success closes the dialog; failure keeps it open with the entered
    /// values intact.
    pub async fn submit(&mut self, client: &QueryClient, toaster: &Toaster) -> ApiResult<ServiceId> {
        let state = self.modal.snapshot();
        let input = ServiceInput {
            name: self.name.clone(),
            service_type: self.service_type,
        };
        let (result, verb) = match (state.mode, state.initial_data) {
            (Mode::Edit, Some(service)) => (client.update_service(&service.id, &input).await, "update"),
            _ => (client.create_service(&input).await, "add"),
        };
        match result {
            Ok(id) => {
                self.modal.close();
                self.sync();
                let done = if verb == "update" { "updated" } else { "added" };
                toaster.success(format!("Service {} successfully", done));
                Ok(id)
            }
            Err(error) => {
                toaster.error(format!("Failed to {} service: {}", verb, error));
                Err(error)
            }
        }
    }
}
