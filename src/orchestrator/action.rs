//! Messages posted to the consumer

use tokio::sync::mpsc;

use crate::asset::AssetId;
use crate::services::ArtifactHandle;
use crate::streaming::RefinementRecord;
use crate::task::TaskTag;

/// What the consumer should do next
#[derive(Debug)]
pub enum Action {
    /// Base artifact published; the asset can be displayed
    AssetReady { asset: AssetId, artifact: ArtifactHandle },
    /// A finer mip level of one texture, in coarse-to-fine order per texture
    TextureUpdated { asset: AssetId, mip_offset: u64, data: Vec<u8> },
    /// Refinements to apply to the displayed mesh, in stream order
    RefinementsAvailable { asset: AssetId, refinements: Vec<RefinementRecord> },
    /// A task failed; `task` is `None` when the asset was rejected at submission
    AssetFailed { asset: AssetId, task: Option<TaskTag>, error: String },
    /// Every submitted task has settled
    AllWorkDone,
}

impl Action {
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            Self::AssetReady { asset, .. }
            | Self::TextureUpdated { asset, .. }
            | Self::RefinementsAvailable { asset, .. }
            | Self::AssetFailed { asset, .. } => Some(*asset),
            Self::AllWorkDone => None,
        }
    }
}

pub type ActionReceiver = mpsc::UnboundedReceiver<Action>;

/// Sending half that tolerates a departed consumer
pub(crate) struct ActionSink {
    tx: mpsc::UnboundedSender<Action>,
    disconnected: bool,
}

impl ActionSink {
    pub(crate) fn channel() -> (Self, ActionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, disconnected: false }, rx)
    }

    pub(crate) fn post(&mut self, action: Action) {
        if self.tx.send(action).is_err() && !self.disconnected {
            self.disconnected = true;
            log::warn!("Action receiver dropped; further actions are discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_after_receiver_dropped() {
        let (mut sink, rx) = ActionSink::channel();
        sink.post(Action::AllWorkDone);
        drop(rx);
        sink.post(Action::AllWorkDone);
        sink.post(Action::AllWorkDone);
        assert!(sink.disconnected);
    }

    #[test]
    fn test_asset_of_action() {
        let action = Action::AssetFailed {
            asset: AssetId(3),
            task: None,
            error: "bad".into(),
        };
        assert_eq!(action.asset(), Some(AssetId(3)));
        assert_eq!(Action::AllWorkDone.asset(), None);
    }
}
