//! Presentation adapters

use crate::domain::PresentationModel;
use crate::ports::outbound::Presentation;
use parking_lot::RwLock;

/// Logs what would be shown.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingPresentation;

impl Presentation for LoggingPresentation {
    fn present(&self, model: PresentationModel) {
        match &model {
            PresentationModel::Notification(n) => {
                tracing::info!(subsystem = "targeting", id = n.id, title = %n.title, "Presenting in-app notification");
            }
            PresentationModel::TargetingAction(a) => {
                tracing::info!(
                    subsystem = "targeting",
                    action_id = a.action_id,
                    action_type = %a.action_type,
                    "Presenting targeting action"
                );
            }
        }
    }
}

/// Collects presented models for assertions.
#[derive(Default)]
pub struct MockPresentation {
    presented: RwLock<Vec<PresentationModel>>,
}

impl MockPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> Vec<PresentationModel> {
        self.presented.read().clone()
    }
}

impl Presentation for MockPresentation {
    fn present(&self, model: PresentationModel) {
        self.presented.write().push(model);
    }
}
