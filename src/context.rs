use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::hub::RealtimeHub;
use crate::messaging::MessageService;
use crate::registry::ConversationRegistry;
use crate::store::ChatStore;

/// Application context containing shared dependencies
/// This reduces parameter passing and makes it easier to add new dependencies
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn ChatStore>,
    pub registry: Arc<ConversationRegistry>,
    pub messages: Arc<MessageService>,
    pub hub: Arc<RealtimeHub>,
    pub auth: Arc<AuthManager>,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wires the component graph over the given store
    pub fn new(store: Arc<dyn ChatStore>, auth: Arc<AuthManager>, config: Arc<Config>) -> Self {
        let hub = Arc::new(RealtimeHub::new(config.hub.broadcast_capacity));
        let registry = Arc::new(ConversationRegistry::new(store.clone()));
        let messages = Arc::new(MessageService::new(store.clone(), hub.clone()));
        Self {
            store,
            registry,
            messages,
            hub,
            auth,
            config,
        }
    }
}
