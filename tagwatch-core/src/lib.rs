pub mod cache;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod inbox;
pub mod monitor;
pub mod question;
pub mod settings;
pub mod source;
pub mod stackexchange;
pub mod subscription;

pub use cache::{cache_key, CacheStats, ResultCache};
pub use detector::detect_new;
pub use dispatch::{Alert, AlertSink, DispatchHandle, Dispatcher, LogSink, NotificationEvent};
pub use error::{AlertError, SettingsError, SourceError};
pub use events::{EventBus, MonitorEvent};
pub use inbox::RecentNotifications;
pub use monitor::{CycleReport, MonitorHandle, TagMonitor};
pub use question::{Question, QuickFilter};
pub use settings::{MonitorSettings, SettingValue, SharedSettings};
pub use source::{CachedSource, QuestionSource};
pub use stackexchange::{StackExchangeClient, StackExchangeConfig};
pub use subscription::{normalize_tag, SubscriptionRegistry, TagSubscription};
