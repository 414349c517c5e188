use std::sync::Arc;

use shared::protocol::ServerEvent;
use tokio::sync::{broadcast, Mutex};

use crate::{generator::Generator, story::Story};

pub(crate) struct AppState {
    pub(crate) story: Mutex<Story>,
    pub(crate) events: broadcast::Sender<ServerEvent>,
    pub(crate) generator: Arc<dyn Generator>,
}

impl AppState {
    pub(crate) fn new(story: Story, generator: Arc<dyn Generator>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            story: Mutex::new(story),
            events,
            generator,
        }
    }
}
