//! Headless notification surfaces. A server has no screen or speaker, so
//! these report what would have been shown through `tracing`.

use tracing::info;

use crate::notify::{AlertPlayer, NativeNotification, NotificationSurface, Permission, Toast, ToastSurface};

/// Answers the permission prompt with a fixed, configured value.
pub struct TracingSurface {
    answer: Permission,
}

impl TracingSurface {
    pub fn new(answer: Permission) -> Self {
        Self { answer }
    }
}

impl NotificationSurface for TracingSurface {
    fn request_permission(&self) -> Permission {
        self.answer
    }

    fn show(&self, n: &NativeNotification) -> anyhow::Result<()> {
        info!(
            tag = %n.tag,
            sticky = n.require_interaction,
            "[notification] {}: {}",
            n.title,
            n.body
        );
        Ok(())
    }
}

pub struct TracingAlert;

impl AlertPlayer for TracingAlert {
    fn play_alert(&self, volume: f32) -> anyhow::Result<()> {
        info!("[alert] urgent sound at volume {:.1}", volume);
        Ok(())
    }
}

pub struct TracingToast;

impl ToastSurface for TracingToast {
    fn show_toast(&self, toast: &Toast) -> anyhow::Result<()> {
        info!(icon = toast.icon, "[toast] {}: {}", toast.title, toast.message);
        Ok(())
    }
}

/// Recording fakes shared by the crate's tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use dashdrop_types::models::{NewRequest, Notification, Request, RequestStatus};

    use super::*;
    use crate::error::{Result, StoreError};
    use crate::notify::NotificationEvent;
    use crate::store::RequestStore;

    #[derive(Default)]
    pub struct RecordingSurface {
        answer: Permission,
        fail: bool,
        prompts: Mutex<usize>,
        shown: Mutex<Vec<NativeNotification>>,
    }

    impl RecordingSurface {
        pub fn answering(answer: Permission) -> Self {
            Self {
                answer,
                ..Default::default()
            }
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        pub fn prompts(&self) -> usize {
            *self.prompts.lock().unwrap()
        }

        pub fn shown(&self) -> Vec<NativeNotification> {
            self.shown.lock().unwrap().clone()
        }
    }

    impl NotificationSurface for RecordingSurface {
        fn request_permission(&self) -> Permission {
            *self.prompts.lock().unwrap() += 1;
            self.answer
        }

        fn show(&self, n: &NativeNotification) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("notification centre unavailable"));
            }
            self.shown.lock().unwrap().push(n.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingAlert {
        volumes: Mutex<Vec<f32>>,
    }

    impl RecordingAlert {
        pub fn plays(&self) -> usize {
            self.volumes.lock().unwrap().len()
        }

        pub fn last_volume(&self) -> Option<f32> {
            self.volumes.lock().unwrap().last().copied()
        }
    }

    impl AlertPlayer for RecordingAlert {
        fn play_alert(&self, volume: f32) -> anyhow::Result<()> {
            self.volumes.lock().unwrap().push(volume);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingToast {
        toasts: Mutex<Vec<Toast>>,
    }

    impl RecordingToast {
        pub fn toasts(&self) -> Vec<Toast> {
            self.toasts.lock().unwrap().clone()
        }
    }

    impl ToastSurface for RecordingToast {
        fn show_toast(&self, toast: &Toast) -> anyhow::Result<()> {
            self.toasts.lock().unwrap().push(toast.clone());
            Ok(())
        }
    }

    /// Every call fails as if the backing store were unreachable.
    pub struct FailingStore;

    fn down<T>() -> Result<T> {
        Err(StoreError::Persistence(anyhow!("store unreachable")))
    }

    impl RequestStore for FailingStore {
        async fn create(&self, _new: NewRequest) -> Result<Request> {
            down()
        }

        async fn accept(&self, _id: &str, _runner_id: &str) -> Result<Request> {
            down()
        }

        async fn set_status(&self, _id: &str, _status: RequestStatus) -> Result<Request> {
            down()
        }

        async fn get(&self, _id: &str) -> Result<Option<Request>> {
            down()
        }

        async fn open_requests(&self) -> Result<Vec<Request>> {
            down()
        }

        async fn record_notification(&self, _event: &NotificationEvent) -> Result<Option<Notification>> {
            down()
        }

        async fn notifications_for(&self, _user_id: &str, _limit: u32) -> Result<Vec<Notification>> {
            down()
        }

        async fn mark_notification_read(&self, _id: &str) -> Result<bool> {
            down()
        }
    }
}
