//! Calendar v3: the invite event created for every form submission.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{check_status, GoogleClient, GoogleError, GoogleToken};

/// Zone the invite is scheduled in.
pub const INVITE_TIME_ZONE: &str = "America/Los_Angeles";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: String,
    pub time_zone: String,
}

impl EventTime {
    fn at(instant: DateTime<Utc>) -> Self {
        Self {
            date_time: instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            time_zone: INVITE_TIME_ZONE.to_string(),
        }
    }
}

/// Body of `events.insert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
}

impl CalendarEvent {
    /// One-hour invite starting a day after `now`.
    pub fn invite(email: &str, message: &str, now: DateTime<Utc>) -> Self {
        let start = now + Duration::days(1);
        let end = start + Duration::hours(1);
        Self {
            summary: format!("Invite from {}", email),
            description: message.to_string(),
            start: EventTime::at(start),
            end: EventTime::at(end),
        }
    }
}

impl GoogleClient {
    /// Insert an event into the primary calendar of the token's owner.
    pub async fn insert_event(
        &self,
        token: &GoogleToken,
        event: &CalendarEvent,
    ) -> Result<(), GoogleError> {
        let url = Self::endpoint(
            &self.calendar_base,
            &["calendar", "v3", "calendars", "primary", "events"],
        )?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&token.access_token)
            .json(event)
            .send()
            .await?;

        check_status(response).await?;
        tracing::debug!("Created calendar invite: {}", event.summary);
        Ok(())
    }
}
