pub mod notifier;

pub use notifier::{
    build_notifier, LogNotifier, Notifier, RecordingNotifier, TelegramNotifier,
};
