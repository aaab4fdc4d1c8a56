mod settings;

pub use settings::{
    CliCommand, Config, NotificationSettings, QuietHoursSettings, Settings,
};
