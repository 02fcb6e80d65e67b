//! Newline-delimited JSON command stream.
//!
//! ```text
//! {"op":"record","page":"Home","properties":{"OM.pv":"SKU-1"}}
//! {"op":"login","ex_visitor_id":"alice"}
//! {"op":"recommend","request":{"zone_id":"6"}}
//! {"op":"subscribe_mail","click":"OM.zn=form&OM.zpc=1","action_id":"12","auth":"t","email":"a@b.c"}
//! {"op":"favorite_attributes","action_id":5}
//! {"op":"flush"}
//! ```

use beacon_tracking::{
    InAppNotification, Properties, RecommendationRequest, Tracker, TrackingApi, TrackingResult,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Record {
        page: String,
        #[serde(default)]
        properties: Properties,
    },
    Campaign {
        #[serde(default)]
        properties: Properties,
    },
    Login {
        ex_visitor_id: String,
        #[serde(default)]
        properties: Properties,
    },
    SignUp {
        ex_visitor_id: String,
        #[serde(default)]
        properties: Properties,
    },
    Logout,
    Flush,
    RecommendationClick {
        query: String,
    },
    NotificationClick {
        notification: InAppNotification,
    },
    Recommend {
        request: RecommendationRequest,
    },
    SubscribeMail {
        click: String,
        action_id: String,
        #[serde(default)]
        auth: String,
        email: String,
    },
    SpinToWinClick {
        click: String,
    },
    SubscribeSpinToWinMail {
        action_id: String,
        #[serde(default)]
        auth: String,
        email: String,
    },
    FavoriteAttributes {
        #[serde(default)]
        action_id: Option<u64>,
    },
    WaitIdle,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Run against the tracker. Returns a JSON line to print, if any.
    pub async fn apply(self, tracker: &Tracker) -> TrackingResult<Option<String>> {
        match self {
            Command::Record { page, properties } => tracker.record(&page, properties)?,
            Command::Campaign { properties } => tracker.send_campaign_parameters(properties)?,
            Command::Login {
                ex_visitor_id,
                properties,
            } => tracker.login(&ex_visitor_id, properties)?,
            Command::SignUp {
                ex_visitor_id,
                properties,
            } => tracker.sign_up(&ex_visitor_id, properties)?,
            Command::Logout => tracker.logout()?,
            Command::Flush => tracker.flush()?,
            Command::RecommendationClick { query } => tracker.track_recommendation_click(&query)?,
            Command::NotificationClick { notification } => {
                tracker.track_notification_click(&notification)?
            }
            Command::Recommend { request } => {
                let response = tracker.recommend(request).await?;
                return Ok(Some(to_line(&response)));
            }
            Command::SubscribeMail {
                click,
                action_id,
                auth,
                email,
            } => tracker.subscribe_mail(&click, &action_id, &auth, &email)?,
            Command::SpinToWinClick { click } => tracker.track_spin_to_win_click(&click)?,
            Command::SubscribeSpinToWinMail {
                action_id,
                auth,
                email,
            } => tracker.subscribe_spin_to_win_mail(&action_id, &auth, &email)?,
            Command::FavoriteAttributes { action_id } => {
                let response = tracker.favorite_attributes(action_id).await?;
                return Ok(Some(to_line(&response)));
            }
            Command::WaitIdle => tracker.wait_idle().await?,
        }
        Ok(None)
    }
}

fn to_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}
