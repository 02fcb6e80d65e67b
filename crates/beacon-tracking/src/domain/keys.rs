//! Wire-level property keys of a flattened event record.

/// Organization identifier
pub const ORGANIZATION_ID: &str = "OM.oid";
/// Profile (site) identifier
pub const PROFILE_ID: &str = "OM.siteID";
/// Device cookie identifier
pub const COOKIE_ID: &str = "OM.cookieID";
/// External (customer-side) visitor identifier
pub const EX_VISITOR_ID: &str = "OM.exVisitorID";
/// Push token identifier
pub const TOKEN_ID: &str = "OM.sys.TokenID";
/// Push application identifier
pub const APP_ID: &str = "OM.sys.AppID";
/// Channel the event was produced on
pub const CHANNEL: &str = "OM.vchannel";
/// Page name
pub const URI: &str = "OM.uri";
/// Mobile application flag
pub const MOBILE_APPLICATION: &str = "OM.mappl";
/// Advertising identifier
pub const MOBILE_ID: &str = "OM.m_adid";
/// Platform tag
pub const API_VERSION: &str = "OM.apiver";
/// SDK version
pub const SDK_VERSION: &str = "OM.sdkversion";
/// Host application version
pub const APP_VERSION: &str = "OM.appVersion";
/// New/returning visitor flag
pub const NRV: &str = "OM.nrv";
/// Page views in the current visit
pub const PVIV: &str = "OM.pviv";
/// Total visit count
pub const TVC: &str = "OM.tvc";
/// Start of the current visit
pub const LVT: &str = "OM.lvt";
/// Event time in unix seconds
pub const DAT: &str = "dat";
/// Tracking-pixel domain tag
pub const DOMAIN: &str = "OM.domain";
/// Campaign zone name for pixel events
pub const ZONE_NAME: &str = "OM.zn";
/// Campaign zone position code for pixel events
pub const ZONE_POSITION: &str = "OM.zpc";

/// Subscription form type
pub const SUBSCRIPTION_TYPE: &str = "type";
/// Targeting action that collected a subscription
pub const ACTION_ID: &str = "actionid";
/// Authentication token issued with a subscription form
pub const AUTHENTICATION: &str = "auth";
/// Subscribed email address
pub const SUBSCRIBED_EMAIL: &str = "OM.subsemail";

/// Recommendation zone
pub const RECOMMENDATION_ZONE_ID: &str = "zoneid";
/// Product the recommendation is made for
pub const RECOMMENDATION_PRODUCT_ID: &str = "prodid";
/// JSON-encoded recommendation filters
pub const RECOMMENDATION_FILTERS: &str = "OM.w.f";

/// Login marker property
pub const LOGIN: &str = "Login";
/// Login flag property
pub const LOGIN_FLAG: &str = "OM.b_login";
/// Sign-up marker property
pub const SIGN_UP: &str = "SignUp";
/// Sign-up flag property
pub const SIGN_UP_FLAG: &str = "OM.b_sgnp";

/// Synthetic page name used by `login`
pub const LOGIN_PAGE: &str = "LoginPage";
/// Synthetic page name used by `sign_up`
pub const SIGN_UP_PAGE: &str = "SignUpPage";
/// Internal tracking-pixel page name
pub const TRACKING_PIXEL_PAGE: &str = "OM_evt.gif";

/// Literal value of boolean wire flags
pub const TRUE: &str = "true";
