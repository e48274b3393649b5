use chatterbox::message::{Dispatcher, Message};
use log::{debug, error, info, warn};
use std::env;

use crate::update_check::UpdateReport;

fn paired_var(primary: &str, secondary: &str) -> Option<(String, String)> {
    let Ok(first) = env::var(primary) else {
        info!("{primary} not defined");
        return None;
    };
    match env::var(secondary) {
        Ok(second) => Some((first, second)),
        Err(_) => {
            warn!("{primary} is set but {secondary} is not, ignoring");
            None
        }
    }
}

/// Builds a dispatcher from `STACKKEEPER_SLACK_*` and `STACKKEEPER_TELEGRAM_*`.
/// Returns `None` if neither is configured.
pub fn setup_dispatcher() -> Option<Dispatcher> {
    let slack = paired_var("STACKKEEPER_SLACK_WEBHOOK_URL", "STACKKEEPER_SLACK_CHANNEL").map(
        |(webhook_url, channel)| {
            info!("Using Slack dispatcher");
            chatterbox::dispatcher::slack::Slack {
                webhook_url,
                channel,
            }
        },
    );
    let telegram = paired_var(
        "STACKKEEPER_TELEGRAM_BOT_TOKEN",
        "STACKKEEPER_TELEGRAM_CHAT_ID",
    )
    .map(|(bot_token, chat_id)| {
        info!("Using Telegram dispatcher");
        chatterbox::dispatcher::telegram::Telegram { bot_token, chat_id }
    });

    if slack.is_none() && telegram.is_none() {
        return None;
    }
    let sender = chatterbox::dispatcher::Sender {
        slack,
        telegram,
        email: None,
    };
    Some(Dispatcher::new(sender))
}

impl From<&UpdateReport> for Option<Message<'_>> {
    fn from(report: &UpdateReport) -> Self {
        match report.summary() {
            Some(summary) => Some(Message::new_now("stack update check", summary)),
            None => {
                debug!("all services current, nothing to send");
                None
            }
        }
    }
}

pub fn notify(report: &UpdateReport, dispatcher: &Dispatcher) {
    let message: Option<Message> = report.into();
    if let Some(message) = message {
        debug!("dispatching update report");
        _ = dispatcher
            .dispatch(&message)
            .inspect_err(|e| error!("failed to dispatch message: {e}"));
    }
}
