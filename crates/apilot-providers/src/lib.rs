//! Apilot Providers
//!
//! Endpoint catalog, two-tier fallback selection, and per-category clients
//! for the public information APIs behind the keyword plugin.

pub mod format;

use apilot_fetch::{Fetch, FetchError};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub use format::MorningDigest;

pub const BASE_URL_VVHAN: &str = "https://api.vvhan.com/api/";
pub const BASE_URL_ALAPI: &str = "https://v3.alapi.cn/api/";

const QQSUU_MOYU_URL: &str = "https://dayu.qqsuu.cn/moyuribao/apis.php?type=json";
const QQSUU_MOYU_VIDEO_URL: &str = "https://dayu.qqsuu.cn/moyuribaoshipin/apis.php?type=json";
const QQSUU_BAGUA_URL: &str = "https://dayu.qqsuu.cn/mingxingbagua/apis.php?type=json";

const HOTLIST_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Failure taxonomy for a provider interaction. Parse failures arrive
/// already folded into `Transport` by the fetch layer; the two are handled
/// identically downstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("alapi token not configured")]
    Config,
    #[error("{reason}")]
    Transport {
        reason: String,
        status: Option<u16>,
    },
    #[error("provider signalled failure: {0}")]
    Semantic(String),
    #[error("missing expected field '{0}' in provider payload")]
    Format(String),
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        ApiError::Transport {
            reason: e.reason,
            status: e.status,
        }
    }
}

/// The information categories the plugin serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    MorningNews,
    MoyuCalendar,
    MoyuVideo,
    Gossip,
    Horoscope,
    HotTrends,
    Express,
    Dictionary,
    GoldPrice,
    OilPrice,
    Weather,
}

/// Concrete endpoint family a call is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Vvhan,
    Alapi,
    Qqsuu,
}

/// Call plan produced by the fallback selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Paid-only category and no credential: reply with configuration
    /// guidance, no network call.
    NeedToken,
    /// Single attempt against one endpoint family.
    Single(Route),
    /// Primary attempt plus at most one fallback attempt; the fallback is
    /// never the route already tried.
    WithFallback { primary: Route, fallback: Route },
}

/// Fallback selector. With a credential the paid endpoint is always
/// preferred; a free-tier alternative, where one exists, is kept as the
/// single permitted fallback. Gossip and the moyu video have exactly one
/// endpoint, so their plans never fall back.
pub fn plan(category: Category, has_token: bool) -> Plan {
    use Category::*;
    use Route::*;
    match (category, has_token) {
        (MorningNews, false) | (Horoscope, false) => Plan::Single(Vvhan),
        (MorningNews, true) | (Horoscope, true) => Plan::WithFallback {
            primary: Alapi,
            fallback: Vvhan,
        },
        (MoyuCalendar, _) => Plan::WithFallback {
            primary: Vvhan,
            fallback: Qqsuu,
        },
        (MoyuVideo, _) | (Gossip, _) => Plan::Single(Qqsuu),
        (HotTrends, _) => Plan::Single(Vvhan),
        (Express | Dictionary | GoldPrice | OilPrice | Weather, false) => Plan::NeedToken,
        (Express | Dictionary | GoldPrice | OilPrice | Weather, true) => Plan::Single(Alapi),
    }
}

/// Forecast span recognized by the weather keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherSpan {
    Today,
    Tomorrow,
    DayAfter,
    Week,
}

impl WeatherSpan {
    /// Maps the optional date word captured by the weather rule. A leading
    /// full- or half-width colon from the capture is tolerated.
    pub fn from_keyword(word: Option<&str>) -> Self {
        match word.map(|w| w.trim_start_matches([':', '：'])) {
            Some("明天") => WeatherSpan::Tomorrow,
            Some("后天") => WeatherSpan::DayAfter,
            Some("7天") | Some("七天") => WeatherSpan::Week,
            _ => WeatherSpan::Today,
        }
    }

    fn is_future(self) -> bool {
        !matches!(self, WeatherSpan::Today)
    }
}

fn payload_message(payload: &Value) -> String {
    payload
        .get("msg")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("未知错误")
        .to_string()
}

/// vvhan envelope: successful iff `success == true`.
fn ensure_vvhan(payload: &Value) -> Result<(), ApiError> {
    if payload.get("success").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(ApiError::Semantic(payload_message(payload)))
    }
}

/// alapi/qqsuu envelope: successful iff `code == 200`.
fn ensure_code_200(payload: &Value) -> Result<(), ApiError> {
    if payload.get("code").and_then(Value::as_i64) == Some(200) {
        Ok(())
    } else {
        Err(ApiError::Semantic(payload_message(payload)))
    }
}

/// Client over the information providers. Holds the fetch seam and the
/// optional paid-tier credential; write-once, read-only thereafter.
pub struct ApiClient {
    fetcher: Arc<dyn Fetch>,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(fetcher: Arc<dyn Fetch>, token: Option<String>) -> Self {
        Self { fetcher, token }
    }

    pub fn has_token(&self) -> bool {
        self.token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    fn token(&self) -> Result<&str, ApiError> {
        self.token.as_deref().filter(|t| !t.trim().is_empty()).ok_or(ApiError::Config)
    }

    fn plan_for(&self, category: Category) -> Plan {
        plan(category, self.has_token())
    }

    pub async fn morning_news(&self) -> Result<MorningDigest, ApiError> {
        match self.plan_for(Category::MorningNews) {
            Plan::NeedToken => Err(ApiError::Config),
            Plan::Single(route) => self.morning_news_from(route).await,
            Plan::WithFallback { primary, fallback } => {
                match self.morning_news_from(primary).await {
                    Ok(digest) => Ok(digest),
                    Err(e) => {
                        warn!("morning news via {:?} failed, trying {:?}: {}", primary, fallback, e);
                        self.morning_news_from(fallback).await
                    }
                }
            }
        }
    }

    async fn morning_news_from(&self, route: Route) -> Result<MorningDigest, ApiError> {
        match route {
            Route::Vvhan => {
                let url = format!("{}60s?type=json", BASE_URL_VVHAN);
                let payload = self.fetcher.post_form(&url, &[("format", "json")]).await?;
                ensure_vvhan(&payload)?;
                format::vvhan_morning_digest(&payload)
            }
            Route::Alapi => {
                let url = format!("{}zaobao", BASE_URL_ALAPI);
                let token = self.token()?;
                let payload = self
                    .fetcher
                    .post_form(&url, &[("token", token), ("format", "json")])
                    .await?;
                ensure_code_200(&payload)?;
                format::alapi_morning_digest(&payload)
            }
            route => Err(ApiError::Semantic(format!(
                "unsupported route {:?} for morning news",
                route
            ))),
        }
    }

    /// Returns the calendar image URL together with the route that served
    /// it; the delivery cascade around the URL differs per route.
    pub async fn moyu_calendar(&self) -> Result<(Route, String), ApiError> {
        match self.plan_for(Category::MoyuCalendar) {
            Plan::NeedToken => Err(ApiError::Config),
            Plan::Single(route) => self.moyu_calendar_from(route).await,
            Plan::WithFallback { primary, fallback } => {
                match self.moyu_calendar_from(primary).await {
                    Ok(hit) => Ok(hit),
                    Err(e) => {
                        warn!("moyu calendar via {:?} failed, trying {:?}: {}", primary, fallback, e);
                        self.moyu_calendar_from(fallback).await
                    }
                }
            }
        }
    }

    async fn moyu_calendar_from(&self, route: Route) -> Result<(Route, String), ApiError> {
        match route {
            Route::Vvhan => {
                let url = format!("{}moyu?type=json", BASE_URL_VVHAN);
                let payload = self.fetcher.post_form(&url, &[("format", "json")]).await?;
                ensure_vvhan(&payload)?;
                let pic = format::string_field(&payload, "url")?;
                Ok((Route::Vvhan, pic))
            }
            Route::Qqsuu => {
                let payload = self
                    .fetcher
                    .post_form(QQSUU_MOYU_URL, &[("format", "json")])
                    .await?;
                ensure_code_200(&payload)?;
                let pic = format::string_field(&payload, "data")?;
                Ok((Route::Qqsuu, pic))
            }
            route => Err(ApiError::Semantic(format!(
                "unsupported route {:?} for moyu calendar",
                route
            ))),
        }
    }

    pub async fn moyu_video(&self) -> Result<String, ApiError> {
        let payload = self
            .fetcher
            .post_form(QQSUU_MOYU_VIDEO_URL, &[("format", "json")])
            .await?;
        ensure_code_200(&payload)?;
        format::string_field(&payload, "data")
    }

    pub async fn gossip(&self) -> Result<String, ApiError> {
        let payload = self
            .fetcher
            .post_form(QQSUU_BAGUA_URL, &[("format", "json")])
            .await?;
        ensure_code_200(&payload)?;
        format::string_field(&payload, "data")
    }

    pub async fn horoscope(&self, sign_slug: &str) -> Result<String, ApiError> {
        match self.plan_for(Category::Horoscope) {
            Plan::NeedToken => Err(ApiError::Config),
            Plan::Single(route) => self.horoscope_from(route, sign_slug).await,
            Plan::WithFallback { primary, fallback } => {
                match self.horoscope_from(primary, sign_slug).await {
                    Ok(text) => Ok(text),
                    Err(e) => {
                        warn!("horoscope via {:?} failed, trying {:?}: {}", primary, fallback, e);
                        self.horoscope_from(fallback, sign_slug).await
                    }
                }
            }
        }
    }

    async fn horoscope_from(&self, route: Route, sign_slug: &str) -> Result<String, ApiError> {
        match route {
            Route::Vvhan => {
                let url = format!("{}horoscope", BASE_URL_VVHAN);
                let payload = self
                    .fetcher
                    .get_json(&url, &[("type", sign_slug), ("time", "today")], &[])
                    .await?;
                ensure_vvhan(&payload)?;
                format::vvhan_horoscope(&payload)
            }
            Route::Alapi => {
                let url = format!("{}star", BASE_URL_ALAPI);
                let token = self.token()?;
                let payload = self
                    .fetcher
                    .post_form(&url, &[("token", token), ("star", sign_slug)])
                    .await?;
                ensure_code_200(&payload)?;
                format::alapi_horoscope(&payload)
            }
            route => Err(ApiError::Semantic(format!(
                "unsupported route {:?} for horoscope",
                route
            ))),
        }
    }

    /// `board_id` is the endpoint identifier from [`hot_board_id`]; unknown
    /// display names never reach this call.
    pub async fn hot_trends(&self, board_id: &str) -> Result<String, ApiError> {
        let url = format!("{}hotlist/{}", BASE_URL_VVHAN, board_id);
        let payload = self
            .fetcher
            .get_json(&url, &[], &[("User-Agent", HOTLIST_USER_AGENT)])
            .await?;
        ensure_vvhan(&payload)?;
        format::hot_trends_list(&payload)
    }

    pub async fn express(&self, tracking_number: &str) -> Result<String, ApiError> {
        let url = format!("{}kd", BASE_URL_ALAPI);
        let token = self.token()?;
        let payload = self
            .fetcher
            .post_form(
                &url,
                &[
                    ("token", token),
                    ("number", tracking_number),
                    ("com", ""),
                    ("order", "asc"),
                ],
            )
            .await?;
        ensure_code_200(&payload)?;
        format::express_trace(&payload)
    }

    pub async fn dictionary(&self, word: &str) -> Result<String, ApiError> {
        let url = format!("{}word", BASE_URL_ALAPI);
        let token = self.token()?;
        let payload = self
            .fetcher
            .get_json(&url, &[("token", token), ("word", word)], &[])
            .await?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ApiError::Semantic(payload_message(&payload)));
        }
        format::word_entry(&payload, word)
    }

    pub async fn gold_price(&self) -> Result<String, ApiError> {
        let url = format!("{}gold", BASE_URL_ALAPI);
        let token = self.token()?;
        let payload = self.fetcher.get_json(&url, &[("token", token)], &[]).await?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ApiError::Semantic(payload_message(&payload)));
        }
        format::gold_quotes(&payload)
    }

    pub async fn oil_price(&self, province: &str) -> Result<String, ApiError> {
        let url = format!("{}oil", BASE_URL_ALAPI);
        let token = self.token()?;
        let payload = self.fetcher.get_json(&url, &[("token", token)], &[]).await?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ApiError::Semantic(payload_message(&payload)));
        }
        format::oil_quotes(&payload, province)
    }

    /// `city_or_id` goes out as `city_id` when purely numeric, `city`
    /// otherwise. Duplicate-name disambiguation happens before this call.
    pub async fn weather(&self, city_or_id: &str, span: WeatherSpan) -> Result<String, ApiError> {
        let url = if span.is_future() {
            format!("{}tianqi/seven", BASE_URL_ALAPI)
        } else {
            format!("{}tianqi", BASE_URL_ALAPI)
        };
        let token = self.token()?;
        let is_id = !city_or_id.is_empty() && city_or_id.chars().all(|c| c.is_ascii_digit());
        let key = if is_id { "city_id" } else { "city" };
        let payload = self
            .fetcher
            .get_json(&url, &[(key, city_or_id), ("token", token)], &[])
            .await?;
        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ApiError::Semantic(payload_message(&payload)));
        }
        let data = match payload.get("data") {
            Some(data) if !data.is_null() => data,
            _ => {
                return Ok("获取天气信息失败，返回数据为空。可能的原因：\n\
                           1. 查询的城市无效。\n\
                           2. 查询的日期格式不被支持（例如“七天”可能不被支持）。\n\
                           3. API 返回数据为空。"
                    .to_string())
            }
        };
        if span.is_future() {
            format::weather_seven(data, span)
        } else {
            format::weather_now(data)
        }
    }
}

/// Chinese zodiac display name to the slug both providers expect.
pub fn zodiac_slug(name: &str) -> Option<&'static str> {
    match name {
        "白羊座" => Some("aries"),
        "金牛座" => Some("taurus"),
        "双子座" => Some("gemini"),
        "巨蟹座" => Some("cancer"),
        "狮子座" => Some("leo"),
        "处女座" => Some("virgo"),
        "天秤座" => Some("libra"),
        "天蝎座" => Some("scorpio"),
        "射手座" => Some("sagittarius"),
        "摩羯座" => Some("capricorn"),
        "水瓶座" => Some("aquarius"),
        "双鱼座" => Some("pisces"),
        _ => None,
    }
}

/// Trending boards in display order; the second element is the vvhan
/// hotlist endpoint id.
pub const HOT_TREND_BOARDS: [(&str, &str); 13] = [
    ("微博", "wbHot"),
    ("虎扑", "huPu"),
    ("知乎", "zhihuHot"),
    ("知乎日报", "zhihuDay"),
    ("哔哩哔哩", "bili"),
    ("36氪", "36Ke"),
    ("抖音", "douyinHot"),
    ("IT", "itNews"),
    ("虎嗅", "huXiu"),
    ("产品经理", "woShiPm"),
    ("头条", "toutiao"),
    ("百度", "baiduRD"),
    ("豆瓣", "douban"),
];

pub fn hot_board_id(name: &str) -> Option<&'static str> {
    HOT_TREND_BOARDS
        .iter()
        .find(|(display, _)| *display == name)
        .map(|(_, id)| *id)
}

/// Fixed guidance listing the supported boards; identical whatever
/// unsupported name triggered it.
pub fn supported_boards_message() -> String {
    let supported: Vec<&str> = HOT_TREND_BOARDS.iter().map(|(display, _)| *display).collect();
    format!(
        "👉 已支持的类型有：\n\n    {}\n\n📝 请按照以下格式发送：\n    类型+热榜  例如：微博热榜",
        supported.join("/")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Stub fetch seam: canned JSON per URL substring, call log for
    /// asserting how many attempts each endpoint received.
    struct StubFetch {
        responses: Vec<(&'static str, Result<Value, FetchError>)>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetch {
        fn new(responses: Vec<(&'static str, Result<Value, FetchError>)>) -> Self {
            Self {
                responses,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn lookup(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.lock().expect("lock").push(url.to_string());
            for (needle, response) in &self.responses {
                if url.contains(needle) {
                    return response.clone();
                }
            }
            Err(FetchError::new(format!("no stub for {}", url)))
        }

        fn calls_containing(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .filter(|u| u.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl Fetch for StubFetch {
        async fn get_json(
            &self,
            url: &str,
            _query: &[(&str, &str)],
            _headers: &[(&str, &str)],
        ) -> Result<Value, FetchError> {
            self.lookup(url)
        }

        async fn post_form(&self, url: &str, _form: &[(&str, &str)]) -> Result<Value, FetchError> {
            self.lookup(url)
        }

        async fn probe_url(&self, _url: &str) -> bool {
            false
        }

        async fn download_image(&self, _url: &str) -> Option<PathBuf> {
            None
        }
    }

    fn build_client(token: Option<&str>, stub: StubFetch) -> (ApiClient, Arc<StubFetch>) {
        let stub = Arc::new(stub);
        let client = ApiClient::new(stub.clone(), token.map(|t| t.to_string()));
        (client, stub)
    }

    #[test]
    fn plan_prefers_paid_with_token_and_keeps_free_fallback() {
        assert_eq!(
            plan(Category::MorningNews, true),
            Plan::WithFallback {
                primary: Route::Alapi,
                fallback: Route::Vvhan
            }
        );
        assert_eq!(plan(Category::MorningNews, false), Plan::Single(Route::Vvhan));
        assert_eq!(
            plan(Category::Horoscope, true),
            Plan::WithFallback {
                primary: Route::Alapi,
                fallback: Route::Vvhan
            }
        );
    }

    #[test]
    fn plan_short_circuits_paid_only_categories_without_token() {
        for category in [
            Category::Express,
            Category::Dictionary,
            Category::GoldPrice,
            Category::OilPrice,
            Category::Weather,
        ] {
            assert_eq!(plan(category, false), Plan::NeedToken);
            assert_eq!(plan(category, true), Plan::Single(Route::Alapi));
        }
    }

    #[test]
    fn plan_moyu_calendar_chains_to_qqsuu_regardless_of_token() {
        for has_token in [false, true] {
            assert_eq!(
                plan(Category::MoyuCalendar, has_token),
                Plan::WithFallback {
                    primary: Route::Vvhan,
                    fallback: Route::Qqsuu
                }
            );
        }
    }

    #[tokio::test]
    async fn failed_primary_attempts_exactly_one_fallback() {
        let stub = StubFetch::new(vec![
            ("vvhan.com/api/moyu", Err(FetchError::with_status("HTTP Error: 500", 500))),
            ("qqsuu.cn/moyuribao", Ok(json!({"code": 200, "data": "https://img.example.com/moyu.png"}))),
        ]);
        let (client, stub) = build_client(None, stub);
        let (route, url) = client.moyu_calendar().await.expect("fallback succeeds");
        assert_eq!(route, Route::Qqsuu);
        assert_eq!(url, "https://img.example.com/moyu.png");
        assert_eq!(stub.calls_containing("vvhan.com/api/moyu"), 1);
        assert_eq!(stub.calls_containing("qqsuu.cn/moyuribao"), 1);
    }

    #[tokio::test]
    async fn failed_fallback_gives_up_after_one_extra_attempt() {
        let stub = StubFetch::new(vec![
            ("vvhan.com/api/moyu", Ok(json!({"success": false}))),
            ("qqsuu.cn/moyuribao", Ok(json!({"code": 500, "msg": "down"}))),
        ]);
        let (client, stub) = build_client(None, stub);
        let err = client.moyu_calendar().await.expect_err("both tiers failed");
        assert!(matches!(err, ApiError::Semantic(_)));
        assert_eq!(stub.calls_containing("vvhan.com/api/moyu"), 1);
        assert_eq!(stub.calls_containing("qqsuu.cn/moyuribao"), 1);
    }

    #[tokio::test]
    async fn free_tier_failure_without_fallback_surfaces_error() {
        // no token: morning news only has the free tier, already tried
        let stub = StubFetch::new(vec![(
            "vvhan.com/api/60s",
            Ok(json!({"success": false, "message": "rate limited"})),
        )]);
        let (client, stub) = build_client(None, stub);
        let err = client.morning_news().await.expect_err("no fallback left");
        assert!(matches!(err, ApiError::Semantic(ref m) if m == "rate limited"));
        assert_eq!(stub.calls_containing("vvhan.com"), 1);
    }

    #[tokio::test]
    async fn paid_only_category_without_token_never_calls_out() {
        let stub = StubFetch::new(vec![]);
        let (client, stub) = build_client(None, stub);
        let err = client.express("YT123").await.expect_err("token required");
        assert!(matches!(err, ApiError::Config));
        assert_eq!(stub.calls_containing("alapi"), 0);
    }

    #[tokio::test]
    async fn weather_uses_city_id_param_for_numeric_query() {
        // the stub ignores params, so assert on the endpoint choice instead
        let stub = StubFetch::new(vec![(
            "tianqi/seven",
            Ok(json!({"success": true, "data": [
                {"city": "北京", "province": "北京", "date": "2024-05-01",
                 "wea_day": "晴", "wea_night": "晴", "temp_day": "20", "temp_night": "10",
                 "sunrise": "05:10", "sunset": "19:10", "index": []}
            ]})),
        )]);
        let (client, _stub) = build_client(Some("tok"), stub);
        let text = client
            .weather("101010100", WeatherSpan::Week)
            .await
            .expect("seven day forecast");
        assert!(text.contains("北京"));
    }

    #[test]
    fn zodiac_and_board_catalogs_resolve_known_names() {
        assert_eq!(zodiac_slug("白羊座"), Some("aries"));
        assert_eq!(zodiac_slug("龙座"), None);
        assert_eq!(hot_board_id("微博"), Some("wbHot"));
        assert_eq!(hot_board_id("随便"), None);
    }

    #[test]
    fn unsupported_board_message_is_input_independent() {
        let msg = supported_boards_message();
        assert!(msg.contains("微博/虎扑"));
        assert!(msg.contains("类型+热榜"));
    }

    #[test]
    fn weather_span_keywords() {
        assert_eq!(WeatherSpan::from_keyword(None), WeatherSpan::Today);
        assert_eq!(WeatherSpan::from_keyword(Some("今天")), WeatherSpan::Today);
        assert_eq!(WeatherSpan::from_keyword(Some(":今天")), WeatherSpan::Today);
        assert_eq!(WeatherSpan::from_keyword(Some("明天")), WeatherSpan::Tomorrow);
        assert_eq!(WeatherSpan::from_keyword(Some("后天")), WeatherSpan::DayAfter);
        assert_eq!(WeatherSpan::from_keyword(Some("七天")), WeatherSpan::Week);
        assert_eq!(WeatherSpan::from_keyword(Some("7天")), WeatherSpan::Week);
    }
}
