//! Widget and admin console flows against the SQLite channel

mod common;

use common::{RecordingChannel, db_channel, eventually, session_service};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use support_chat::core::admin::{AdminConsole, SessionStats, StatusFilter};
use support_chat::core::config::{ChatConfig, ReopenPolicy};
use support_chat::core::errors::ChatError;
use support_chat::core::positioning::{DragRelease, Pointer, Viewport, WidgetPosition};
use support_chat::core::services::ChannelSessionService;
use support_chat::core::traits::{SessionService, VisitorInfo};
use support_chat::core::widget::WidgetController;
use support_chat::infrastructure::entities::{Sender, SessionStatus};
use support_chat::infrastructure::position_store::MemoryPositionStore;
use support_chat::infrastructure::traits::{ChatChannel, PositionStore};
use uuid::Uuid;

fn desktop() -> Viewport {
    Viewport::new(1280.0, 800.0)
}

fn contact(name: &str) -> VisitorInfo {
    VisitorInfo {
        name: name.to_string(),
        email: format!("{}@x.com", name.to_lowercase()),
        phone: None,
    }
}

struct Fixture {
    channel: Arc<RecordingChannel>,
    service: Arc<ChannelSessionService>,
}

async fn fixture(config: ChatConfig) -> Fixture {
    let channel = Arc::new(RecordingChannel::new(db_channel().await));
    let service = Arc::new(session_service(channel.clone(), config));
    Fixture { channel, service }
}

impl Fixture {
    fn widget(&self, store: Arc<MemoryPositionStore>) -> WidgetController {
        WidgetController::mount(self.service.clone(), self.channel.clone(), store, desktop())
    }

    async fn admin(&self, config: ChatConfig) -> AdminConsole {
        AdminConsole::mount(self.service.clone(), self.channel.clone(), Arc::new(config))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_widget_contact_form_and_first_messages() {
    let f = fixture(ChatConfig::default()).await;
    let mut widget = f.widget(Arc::new(MemoryPositionStore::default()));

    let view = widget.view();
    assert!(!view.open);
    assert_eq!(view.session_id, None);
    assert!(!view.can_start);
    assert!(!view.can_send);

    widget.set_contact(contact("An"));
    assert!(widget.can_start());

    let session_id = widget.submit_contact().await.unwrap();
    assert!(!widget.can_start());
    // submitting again does not start a second chat
    assert_eq!(widget.submit_contact().await.unwrap(), session_id);

    assert!(eventually(|| async { widget.view().messages.len() == 1 }).await);
    let view = widget.view();
    assert_eq!(view.messages[0].sender, Sender::Operator);
    assert_eq!(view.unread_count, 1);
    // the panel is closed, so the greeting stays unread
    assert!(f.channel.mark_read_calls().is_empty());

    widget.open();
    assert!(eventually(|| async { widget.view().unread_count == 0 }).await);
    assert_eq!(f.channel.mark_read_calls(), vec![view.messages[0].id]);

    widget.set_draft("   ");
    assert!(!widget.can_send());
    widget.set_draft("Hello");
    assert!(widget.can_send());
    widget.send().await.unwrap();
    assert_eq!(widget.draft(), "");

    assert!(eventually(|| async { widget.view().messages.len() == 2 }).await);
    let messages = widget.view().messages;
    let hello = &messages[1];
    assert_eq!(hello.text, "Hello");
    assert_eq!(hello.sender_name.as_deref(), Some("An"));

    let session = f.service.get_session(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Active);
}

#[tokio::test]
async fn test_widget_rejects_incomplete_contact() {
    let f = fixture(ChatConfig::default()).await;
    let mut widget = f.widget(Arc::new(MemoryPositionStore::default()));

    widget.set_contact(VisitorInfo {
        name: "An".to_string(),
        email: "  ".to_string(),
        phone: None,
    });
    assert!(!widget.can_start());
    assert!(matches!(
        widget.submit_contact().await,
        Err(ChatError::Validation(_))
    ));
    assert_eq!(widget.session_id(), None);
    assert!(f.channel.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_widget_keeps_draft_when_session_is_closed() {
    let config = ChatConfig {
        reopen_policy: ReopenPolicy::Reject,
        ..ChatConfig::default()
    };
    let f = fixture(config).await;
    let mut widget = f.widget(Arc::new(MemoryPositionStore::default()));
    widget.set_contact(contact("An"));
    let session_id = widget.submit_contact().await.unwrap();

    f.service.close_session(session_id).await.unwrap();

    widget.set_draft("Still there?");
    let result = widget.send().await;
    assert!(matches!(result, Err(ChatError::SessionClosed(_))));
    assert_eq!(widget.draft(), "Still there?");
    assert!(widget.view().closed);
    assert!(!widget.can_send());
}

#[tokio::test]
async fn test_widget_click_toggles_and_drag_persists() {
    let f = fixture(ChatConfig::default()).await;
    let store = Arc::new(MemoryPositionStore::default());
    let mut widget = f.widget(store.clone());

    let start = widget.view().control;
    assert_eq!(start, WidgetPosition::new(1196.0, 716.0));

    let press = Pointer::Mouse {
        button: 0,
        x: start.x + 10.0,
        y: start.y + 10.0,
    };
    assert!(widget.pointer_down(press));
    assert_eq!(widget.pointer_up(), DragRelease::Click);
    assert!(widget.view().open);

    // right button does not grab the widget
    assert!(!widget.pointer_down(Pointer::Mouse {
        button: 2,
        x: start.x,
        y: start.y
    }));

    assert!(widget.pointer_down(press));
    widget.pointer_move(Pointer::Mouse {
        button: 0,
        x: start.x - 190.0,
        y: start.y - 290.0,
    });
    assert_eq!(widget.pointer_up(), DragRelease::Dragged);
    assert!(widget.view().open);

    let dropped = widget.view().control;
    assert_eq!(dropped, WidgetPosition::new(start.x - 200.0, start.y - 300.0));
    let saved: WidgetPosition = serde_json::from_str(&store.load().unwrap()).unwrap();
    assert_eq!(saved, dropped);

    let remounted = f.widget(store);
    assert_eq!(remounted.view().control, dropped);
}

#[tokio::test]
async fn test_widget_resize_keeps_button_on_screen() {
    let f = fixture(ChatConfig::default()).await;
    let store = Arc::new(MemoryPositionStore::with_value(r#"{"x":1196,"y":716}"#));
    let mut widget = f.widget(store);

    widget.resize(Viewport::new(375.0, 667.0));
    let view = widget.view();
    assert_eq!(view.control, WidgetPosition::new(375.0 - 56.0 - 15.0, 667.0 - 56.0 - 15.0));
    assert!(view.panel.x >= 8.0 && view.panel.x + view.panel.width <= 375.0 - 8.0);

    widget.resize(desktop());
    assert_eq!(widget.view().control, WidgetPosition::new(1196.0, 716.0));
}

#[tokio::test]
async fn test_admin_console_handles_a_conversation() {
    let f = fixture(ChatConfig::default()).await;
    let mut admin = f.admin(ChatConfig::default()).await;

    let an = f.service.start_session(contact("An")).await.unwrap();
    let binh = f.service.start_session(contact("Binh")).await.unwrap();
    f.service
        .send_visitor_message(an, "I need help with my booking", None)
        .await
        .unwrap();

    assert!(
        eventually(|| async {
            admin.stats()
                == SessionStats {
                    waiting: 1,
                    active: 1,
                    total: 2,
                }
        })
        .await
    );
    let waiting: Vec<Uuid> = admin
        .filtered_sessions("", StatusFilter::Only(SessionStatus::Waiting))
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(waiting, vec![binh]);
    assert_eq!(admin.filtered_sessions("BINH@", StatusFilter::All).len(), 1);

    admin.select_session(an).await.unwrap();
    assert_eq!(admin.selected_session().map(|s| s.id), Some(an));
    assert!(eventually(|| async { admin.messages().len() == 2 }).await);
    assert!(eventually(|| async { admin.unread_count() == 0 }).await);
    admin.set_draft("");
    assert!(!admin.can_send());

    assert!(!admin.insert_quick_reply(99));
    assert!(admin.insert_quick_reply(0));
    assert_eq!(admin.draft(), admin.quick_replies()[0]);
    assert!(admin.can_send());
    admin.send().await.unwrap();
    assert_eq!(admin.draft(), "");

    assert!(eventually(|| async { admin.messages().len() == 3 }).await);
    let reply = admin.messages().pop().unwrap();
    assert_eq!(reply.sender, Sender::Operator);
    assert_eq!(reply.sender_name.as_deref(), Some("Support agent"));
    assert_eq!(reply.text, "Hello! How can I help you?");

    let stored = f.channel.list_messages(an).await.unwrap();
    assert!(
        stored
            .iter()
            .filter(|m| m.sender == Sender::Visitor)
            .all(|m| m.read)
    );

    admin.close_selected().await.unwrap();
    admin.set_draft("One more thing");
    assert!(!admin.can_send());
    assert!(matches!(
        admin.send().await,
        Err(ChatError::SessionClosed(_))
    ));
    assert_eq!(admin.draft(), "One more thing");
    assert!(
        eventually(|| async {
            admin
                .filtered_sessions("", StatusFilter::Only(SessionStatus::Closed))
                .len()
                == 1
        })
        .await
    );

    admin.deselect();
    assert!(admin.selected_session().is_none());
    assert!(admin.messages().is_empty());
}

#[tokio::test]
async fn test_admin_actions_need_a_selection() {
    let f = fixture(ChatConfig::default()).await;
    let mut admin = f.admin(ChatConfig::default()).await;

    admin.set_draft("Hello");
    assert!(!admin.can_send());
    assert!(matches!(admin.send().await, Err(ChatError::Validation(_))));
    assert!(matches!(
        admin.close_selected().await,
        Err(ChatError::Validation(_))
    ));
}

#[tokio::test]
async fn test_widget_failed_start_and_send_leave_state_unchanged() {
    let f = fixture(ChatConfig::default()).await;
    let mut widget = f.widget(Arc::new(MemoryPositionStore::default()));
    widget.set_contact(contact("An"));

    f.channel.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        widget.submit_contact().await,
        Err(ChatError::Transport(_))
    ));
    assert_eq!(widget.session_id(), None);
    assert!(widget.can_start());

    f.channel.fail_writes.store(false, Ordering::SeqCst);
    widget.submit_contact().await.unwrap();
    assert!(eventually(|| async { widget.view().messages.len() == 1 }).await);

    f.channel.fail_writes.store(true, Ordering::SeqCst);
    widget.set_draft("Hello");
    assert!(matches!(widget.send().await, Err(ChatError::Transport(_))));
    assert_eq!(widget.draft(), "Hello");
    assert!(widget.can_send());
    assert!(!widget.view().closed);

    f.channel.fail_writes.store(false, Ordering::SeqCst);
    widget.send().await.unwrap();
    assert!(eventually(|| async { widget.view().messages.len() == 2 }).await);
}

#[tokio::test]
async fn test_widget_retries_a_failed_watch() {
    let f = fixture(ChatConfig::default()).await;
    let mut widget = f.widget(Arc::new(MemoryPositionStore::default()));
    widget.set_contact(contact("An"));

    f.channel.fail_next_watch.store(true, Ordering::SeqCst);
    assert!(matches!(
        widget.submit_contact().await,
        Err(ChatError::Transport(_))
    ));
    let session_id = widget.session_id().unwrap();

    // the session is kept, only the watch is set up again
    assert_eq!(widget.submit_contact().await.unwrap(), session_id);
    assert_eq!(f.channel.list_sessions().await.unwrap().len(), 1);
    assert!(eventually(|| async { widget.view().messages.len() == 1 }).await);
}

#[tokio::test]
async fn test_admin_failed_send_keeps_draft() {
    let f = fixture(ChatConfig::default()).await;
    let mut admin = f.admin(ChatConfig::default()).await;
    let an = f.service.start_session(contact("An")).await.unwrap();
    assert!(eventually(|| async { admin.sessions().len() == 1 }).await);
    admin.select_session(an).await.unwrap();

    f.channel.fail_writes.store(true, Ordering::SeqCst);
    admin.set_draft("Hi An!");
    assert!(matches!(admin.send().await, Err(ChatError::Transport(_))));
    assert_eq!(admin.draft(), "Hi An!");
    assert!(admin.can_send());
}
