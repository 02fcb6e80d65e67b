//! Targeting and recommendation models
//!
//! Results resolved by the remote targeting service and handed to the
//! presentation layer, plus the request/response shapes of recommendation,
//! favorite-attribute and subscription calls.

use super::entities::{non_blank, ProfileConfig, Properties, UserState};
use super::keys;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Legacy in-app notification resolved by the notification check.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InAppNotification {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub button_text: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    /// Copied into `UserState::visit_data` once presented
    pub visit_data: Option<String>,
    /// Copied into `UserState::visitor_data` once presented
    pub visitor_data: Option<String>,
    /// Click report query string, `OM.zn=<zone>&OM.zpc=<position>`
    pub query_string: Option<String>,
}

/// General targeting action (popup, carousel, spin-to-win...).
///
/// The payload is opaque to the pipeline and passed through to presentation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetingAction {
    pub action_id: u64,
    pub action_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Everything the pipeline may ask the presentation layer to show.
#[derive(Clone, Debug, PartialEq)]
pub enum PresentationModel {
    Notification(InAppNotification),
    TargetingAction(TargetingAction),
}

impl PresentationModel {
    pub fn kind(&self) -> &'static str {
        match self {
            PresentationModel::Notification(_) => "notification",
            PresentationModel::TargetingAction(_) => "action",
        }
    }
}

/// Zone and position extracted from a click query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickReport {
    pub zone_name: String,
    pub zone_position: String,
}

/// Split `k=v&k=v...` into pairs.
///
/// At least two `&`-separated items are required; items that are not exactly
/// `key=value` are skipped.
pub fn parse_query_pairs(query: &str) -> Result<Vec<(String, String)>, ValidationError> {
    let items: Vec<&str> = query.split('&').collect();
    if items.len() < 2 {
        return Err(ValidationError::MalformedQueryString {
            query: query.to_string(),
        });
    }
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let parts: Vec<&str> = item.split('=').collect();
            match parts.as_slice() {
                [key, value] => Some(((*key).to_string(), (*value).to_string())),
                _ => None,
            }
        })
        .collect())
}

impl ClickReport {
    /// Positional parse: the first item is the zone, the second the position.
    pub fn parse(query: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedQueryString {
            query: query.to_string(),
        };
        let mut items = query.split('&');
        let value_of = |item: Option<&str>| -> Option<String> {
            item.and_then(|i| i.split_once('='))
                .map(|(_, value)| value.to_string())
        };
        let zone_name = value_of(items.next()).ok_or_else(malformed)?;
        let zone_position = value_of(items.next()).ok_or_else(malformed)?;
        Ok(Self {
            zone_name,
            zone_position,
        })
    }

    /// Keyed parse used by action forms: `OM.zn` and `OM.zpc` may appear in
    /// any order among other pairs.
    pub fn parse_keyed(query: &str) -> Result<Self, ValidationError> {
        let mut zone_name = None;
        let mut zone_position = None;
        for item in query.split('&') {
            match item.split_once('=') {
                Some((keys::ZONE_NAME, value)) => zone_name = Some(value.to_string()),
                Some((keys::ZONE_POSITION, value)) => zone_position = Some(value.to_string()),
                _ => {}
            }
        }
        match (zone_name, zone_position) {
            (Some(zone_name), Some(zone_position)) => Ok(Self {
                zone_name,
                zone_position,
            }),
            _ => Err(ValidationError::MalformedQueryString {
                query: query.to_string(),
            }),
        }
    }
}

/// Comparison applied by a recommendation filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Equals,
    NotEquals,
    Like,
    NotLike,
    GreaterThan,
    LessThan,
    GreaterOrEquals,
    LessOrEquals,
}

impl FilterType {
    /// Numeric code used by the recommendation endpoint
    pub fn code(self) -> u8 {
        match self {
            FilterType::Equals => 0,
            FilterType::NotEquals => 1,
            FilterType::Like => 2,
            FilterType::NotLike => 3,
            FilterType::GreaterThan => 4,
            FilterType::LessThan => 5,
            FilterType::GreaterOrEquals => 6,
            FilterType::LessOrEquals => 7,
        }
    }
}

/// Product attribute a filter applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductAttribute {
    Title,
    Img,
    Code,
    DestUrl,
    Brand,
    Price,
    Dprice,
    Cur,
    Rating,
    Comment,
    Freeshipping,
    Samedayshipping,
    Attr1,
    Attr2,
    Attr3,
    Attr4,
    Attr5,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationFilter {
    pub attribute: ProductAttribute,
    pub filter_type: FilterType,
    pub value: String,
}

impl RecommendationFilter {
    pub fn new(attribute: ProductAttribute, filter_type: FilterType, value: impl Into<String>) -> Self {
        Self {
            attribute,
            filter_type,
            value: value.into(),
        }
    }
}

/// A recommendation lookup for one zone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub zone_id: String,
    pub product_code: Option<String>,
    pub filters: Vec<RecommendationFilter>,
    pub properties: Properties,
}

impl RecommendationRequest {
    pub fn for_zone(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            ..Self::default()
        }
    }

    pub fn with_product(mut self, product_code: impl Into<String>) -> Self {
        self.product_code = Some(product_code.into());
        self
    }

    pub fn with_filter(mut self, filter: RecommendationFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filters as the endpoint expects them:
    /// `[{"attr":"brand","ft":0,"fv":"acme"}]`
    pub fn encode_filters(&self) -> String {
        let encoded: Vec<EncodedFilter<'_>> = self
            .filters
            .iter()
            .map(|f| EncodedFilter {
                attr: f.attribute,
                ft: f.filter_type.code(),
                fv: &f.value,
            })
            .collect();
        serde_json::to_string(&encoded).unwrap_or_default()
    }

    /// Query parameters of the lookup. Caller properties come first and are
    /// overridden by the zone, product and filter parameters.
    pub fn query_parameters(&self) -> Properties {
        let mut params = self.properties.clone();
        params.insert(keys::RECOMMENDATION_ZONE_ID.to_string(), self.zone_id.clone());
        if let Some(product_code) = non_blank(self.product_code.as_deref()) {
            params.insert(
                keys::RECOMMENDATION_PRODUCT_ID.to_string(),
                product_code.to_string(),
            );
        }
        if !self.filters.is_empty() {
            params.insert(keys::RECOMMENDATION_FILTERS.to_string(), self.encode_filters());
        }
        params
    }
}

#[derive(Serialize)]
struct EncodedFilter<'a> {
    attr: ProductAttribute,
    ft: u8,
    fv: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub code: String,
    pub title: String,
    pub img: String,
    pub dest_url: String,
    pub brand: String,
    pub price: f64,
    pub dprice: f64,
    pub cur: String,
    pub dcur: String,
    pub freeshipping: bool,
    pub samedayshipping: bool,
    pub rating: i64,
    pub comment: i64,
    pub discount: f64,
    pub attr1: String,
    pub attr2: String,
    pub attr3: String,
    pub attr4: String,
    pub attr5: String,
}

/// Products resolved for a recommendation request.
///
/// A failed lookup resolves to an empty product list with `error` set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub products: Vec<Product>,
    pub error: Option<String>,
}

impl RecommendationResponse {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            products: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Favorite attribute values per attribute name (`brand`, `category`...).
pub type FavoriteAttributes = BTreeMap<String, Vec<String>>;

/// Answer to a favorite-attribute lookup.
///
/// A failed lookup resolves to an empty map with `error` set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoriteAttributeResponse {
    pub favorites: FavoriteAttributes,
    pub error: Option<String>,
}

impl FavoriteAttributeResponse {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            favorites: FavoriteAttributes::new(),
            error: Some(reason.into()),
        }
    }
}

/// Form an email subscription was collected from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Mail subscription form action
    Email,
    /// Mail form inside a spin-to-win action
    SpinToWinEmail,
}

impl SubscriptionKind {
    pub fn wire_type(self) -> &'static str {
        match self {
            SubscriptionKind::Email => "subscription_email",
            SubscriptionKind::SpinToWinEmail => "spin_to_win_email",
        }
    }
}

/// An email subscription submitted through a targeting action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub kind: SubscriptionKind,
    pub action_id: String,
    pub auth: String,
    pub email: String,
}

impl SubscriptionRequest {
    /// The email must be non-blank.
    pub fn new(
        kind: SubscriptionKind,
        action_id: impl Into<String>,
        auth: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let email = email.into();
        if email.trim().is_empty() {
            return Err(ValidationError::EmptyEmail);
        }
        Ok(Self {
            kind,
            action_id: action_id.into(),
            auth: auth.into(),
            email,
        })
    }

    /// Flatten with the profile, the visitor identity and the current channel.
    pub fn to_properties(
        &self,
        profile: &ProfileConfig,
        user: &UserState,
        channel: &str,
    ) -> Properties {
        let mut props = Properties::new();
        props.insert(keys::ORGANIZATION_ID.to_string(), profile.organization_id.clone());
        props.insert(keys::PROFILE_ID.to_string(), profile.profile_id.clone());
        if let Some(cookie_id) = non_blank(user.cookie_id.as_deref()) {
            props.insert(keys::COOKIE_ID.to_string(), cookie_id.to_string());
        }
        if let Some(ex_visitor_id) = non_blank(user.ex_visitor_id.as_deref()) {
            props.insert(keys::EX_VISITOR_ID.to_string(), ex_visitor_id.to_string());
        }
        props.insert(
            keys::SUBSCRIPTION_TYPE.to_string(),
            self.kind.wire_type().to_string(),
        );
        props.insert(keys::ACTION_ID.to_string(), self.action_id.clone());
        props.insert(keys::AUTHENTICATION.to_string(), self.auth.clone());
        props.insert(keys::SUBSCRIBED_EMAIL.to_string(), self.email.clone());
        props.insert(keys::CHANNEL.to_string(), channel.to_string());
        props
    }
}
