use std::collections::HashMap;

use parking_lot::RwLock;

/// Which kind of event a subscriber is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountAuthenticated,
    ServerSelected,
    PlayerJoined,
    PlayerLeft,
    MailRequested,
    GameServerRegistered,
    GameServerLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Credentials were accepted and a login pair was issued.
    AccountAuthenticated { account: String },
    /// A play pair was issued for `server_id`.
    ServerSelected { account: String, server_id: u8 },
    /// A game server reported the account as in game.
    PlayerJoined { account: String, server_id: u8 },
    PlayerLeft { account: String, server_id: u8 },
    /// A game server asked for mail to be delivered to an account.
    MailRequested {
        account: String,
        mail_id: String,
        args: Vec<String>,
    },
    GameServerRegistered { server_id: u8 },
    GameServerLost { server_id: u8 },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AccountAuthenticated { .. } => EventKind::AccountAuthenticated,
            Event::ServerSelected { .. } => EventKind::ServerSelected,
            Event::PlayerJoined { .. } => EventKind::PlayerJoined,
            Event::PlayerLeft { .. } => EventKind::PlayerLeft,
            Event::MailRequested { .. } => EventKind::MailRequested,
            Event::GameServerRegistered { .. } => EventKind::GameServerRegistered,
            Event::GameServerLost { .. } => EventKind::GameServerLost,
        }
    }
}

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// Subscribers keyed by the kind of event they care about. Handlers run
/// synchronously on the publishing task, so they should hand off anything slow.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Calls every subscriber for the event's kind, returns how many there were.
    pub fn publish(&self, event: Event) -> usize {
        let handlers = self.handlers.read();
        let Some(subscribers) = handlers.get(&event.kind()) else {
            tracing::trace!("Nobody is listening for {:?}", event.kind());
            return 0;
        };

        for handler in subscribers {
            handler(&event);
        }

        subscribers.len()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventRegistry")
            .field("kinds", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn only_matching_kinds_are_called() {
        let registry = EventRegistry::new();
        let joined = Arc::new(AtomicUsize::new(0));

        let counter = joined.clone();
        registry.subscribe(EventKind::PlayerJoined, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = registry.publish(Event::PlayerJoined {
            account: "alice".to_string(),
            server_id: 1,
        });
        assert_eq!(delivered, 1);

        let delivered = registry.publish(Event::PlayerLeft {
            account: "alice".to_string(),
            server_id: 1,
        });
        assert_eq!(delivered, 0);
        assert_eq!(joined.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_see_the_payload() {
        let registry = EventRegistry::new();
        let mail = Arc::new(Mutex::new(Vec::new()));

        let inbox = mail.clone();
        registry.subscribe(EventKind::MailRequested, move |event| {
            if let Event::MailRequested { account, mail_id, .. } = event {
                inbox.lock().push((account.clone(), mail_id.clone()));
            }
        });
        registry.subscribe(EventKind::MailRequested, |_| {});

        let delivered = registry.publish(Event::MailRequested {
            account: "bob".to_string(),
            mail_id: "welcome".to_string(),
            args: Vec::new(),
        });

        assert_eq!(delivered, 2);
        assert_eq!(
            *mail.lock(),
            vec![("bob".to_string(), "welcome".to_string())]
        );
    }
}
