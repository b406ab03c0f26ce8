//! Apilot Core
//!
//! Keyword routing and reply assembly for the information-API chat plugin:
//! composes the fetch seam, the fallback selector, the per-category
//! formatters, and city disambiguation behind one `handle` entry point.

pub mod cities;
pub mod render;
pub mod reply;
pub mod router;

pub use cities::{CityRecord, CityResolution, CityTable};
pub use render::{NoRender, RenderText};
pub use reply::{MediaHint, Reply, ReplyKind};
pub use router::{Command, Router};

use apilot_config::Config;
use apilot_fetch::{Fetch, HttpFetcher};
use apilot_providers::{
    hot_board_id, supported_boards_message, zodiac_slug, ApiClient, ApiError, Route, WeatherSpan,
};
use std::sync::Arc;
use tracing::{debug, error, info};

const TOKEN_GUIDANCE: &str = "请先配置alapi的token";

/// The plugin facade. Constructed once by the host with its configuration;
/// the credential and the city table are write-once and read-only from
/// then on.
pub struct Apilot {
    config: Config,
    router: Router,
    api: ApiClient,
    fetcher: Arc<dyn Fetch>,
    renderer: Box<dyn RenderText>,
}

impl Apilot {
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(config, Arc::new(HttpFetcher::new()), Box::new(NoRender))
    }

    /// Build with injected collaborators (tests, custom rasterizers).
    pub fn with_collaborators(
        config: Config,
        fetcher: Arc<dyn Fetch>,
        renderer: Box<dyn RenderText>,
    ) -> Self {
        // explicit table init: the first weather query must not pay the
        // parse, and test setup stays deterministic
        CityTable::global();
        let api = ApiClient::new(fetcher.clone(), config.alapi_token.clone());
        info!(
            "Apilot plugin initialized (token configured: {})",
            config.has_token()
        );
        Self {
            config,
            router: Router::new(),
            api,
            fetcher,
            renderer,
        }
    }

    /// Single inbound entry point, one call per user message. `None` means
    /// no keyword rule matched and the host should fall through to its
    /// default handling. Failures never escape: they are logged and
    /// downgraded to guidance text.
    pub async fn handle(&self, text: &str) -> Option<Reply> {
        let content = text.trim();
        debug!("handling content: {}", content);
        let command = self.router.route(content)?;
        Some(self.dispatch(command).await)
    }

    async fn dispatch(&self, command: Command) -> Reply {
        match command {
            Command::MorningNews => Reply::classify(self.morning_news().await, MediaHint::Image),
            Command::MoyuCalendar => Reply::classify(self.moyu_calendar().await, MediaHint::Image),
            Command::MoyuVideo => Reply::classify(self.moyu_video().await, MediaHint::Video),
            Command::Gossip => Reply::classify(self.gossip().await, MediaHint::Image),
            Command::Express { number } => Reply::text(self.express(&number).await),
            Command::Horoscope { sign } => Reply::text(self.horoscope(&sign).await),
            Command::HotTrends { board } => Reply::text(self.hot_trends(&board).await),
            Command::Dictionary { word } => Reply::text(self.dictionary(&word).await),
            Command::GoldPrice => Reply::text(self.gold_price().await),
            Command::OilPrice { province } => Reply::text(self.oil_price(&province).await),
            Command::Weather {
                city_or_id,
                span_word,
            } => Reply::text(self.weather(&city_or_id, span_word.as_deref()).await),
        }
    }

    /// Help card for the host's command listing.
    pub fn help_text(&self, verbose: bool) -> String {
        if !verbose {
            return " 发送特定指令以获取早报、热榜、查询天气、星座运势、快递信息等！".to_string();
        }
        let mut help_text = String::from("📚 发送关键词获取特定信息！\n");
        help_text.push_str("\n🎉 娱乐与资讯：\n");
        help_text.push_str("  🌅 早报: 发送“早报”获取早报。\n");
        help_text.push_str("  🌴 摸鱼: 发送“摸鱼”获取摸鱼人日历。\n");
        help_text.push_str("  🔥 热榜: 发送“xx热榜”查看支持的热榜。\n");
        help_text.push_str("  🔥 八卦: 发送“八卦”获取明星八卦。\n");
        help_text.push_str("\n🔍 查询工具：\n");
        help_text.push_str("  🌤️ 天气: 发送“城市+天气”查天气，如“北京天气”。\n");
        help_text.push_str("  📦 快递: 发送“快递+单号”查询快递状态。如“快递112345655”\n");
        help_text.push_str("  🌌 星座: 发送星座名称查看今日运势，如“白羊座”。\n");
        help_text
    }

    fn downgrade(&self, error: &ApiError, message: &str) -> String {
        error!("{}，错误信息：{}", message, error);
        message.to_string()
    }

    async fn morning_news(&self) -> String {
        match self.api.morning_news().await {
            Ok(digest) => {
                if self.config.morning_news_text_enabled {
                    return format!("{}\n\n{}", digest.title, digest.text);
                }
                if let Some(path) = self.renderer.render(&digest.text, Some(&digest.title)) {
                    return path.display().to_string();
                }
                // render declined: provider image next, URL as last media
                if let Some(img_url) = digest.image_url {
                    if self.fetcher.probe_url(&img_url).await {
                        if let Some(path) = self.fetcher.download_image(&img_url).await {
                            return path.display().to_string();
                        }
                    }
                    return img_url;
                }
                format!("{}\n\n{}", digest.title, digest.text)
            }
            Err(e) => {
                let message = if self.config.has_token() {
                    "早报获取失败，请检查 token 是否有误"
                } else {
                    "早报信息获取失败，可配置“alapi token”切换至 Alapi 服务，或者稍后再试"
                };
                self.downgrade(&e, message)
            }
        }
    }

    async fn moyu_calendar(&self) -> String {
        match self.api.moyu_calendar().await {
            Ok((Route::Qqsuu, pic_url)) => {
                if self.fetcher.probe_url(&pic_url).await {
                    if let Some(path) = self.fetcher.download_image(&pic_url).await {
                        return path.display().to_string();
                    }
                    return pic_url;
                }
                "周末无需摸鱼，愉快玩耍吧".to_string()
            }
            Ok((_, pic_url)) => {
                if self.fetcher.probe_url(&pic_url).await {
                    if let Some(path) = self.fetcher.download_image(&pic_url).await {
                        return path.display().to_string();
                    }
                }
                pic_url
            }
            Err(e) => self.downgrade(&e, "暂无可用“摸鱼”服务，认真上班"),
        }
    }

    async fn moyu_video(&self) -> String {
        match self.api.moyu_video().await {
            Ok(video_url) => {
                if self.fetcher.probe_url(&video_url).await {
                    video_url
                } else {
                    "视频版没了，看看文字版吧".to_string()
                }
            }
            Err(e) => self.downgrade(&e, "视频版没了，看看文字版吧"),
        }
    }

    async fn gossip(&self) -> String {
        match self.api.gossip().await {
            Ok(pic_url) => {
                if self.fetcher.probe_url(&pic_url).await {
                    if let Some(path) = self.fetcher.download_image(&pic_url).await {
                        return path.display().to_string();
                    }
                    return pic_url;
                }
                "周末不更新，请微博吃瓜".to_string()
            }
            Err(e) => self.downgrade(&e, "暂无明星八卦，吃瓜莫急"),
        }
    }

    async fn express(&self, number: &str) -> String {
        if !self.config.has_token() {
            return self.downgrade(&ApiError::Config, TOKEN_GUIDANCE);
        }
        if number.is_empty() {
            return "请在“快递”后追加运单号，如：快递YT1234567890".to_string();
        }
        // SF lookups require the recipient phone suffix; refuse locally
        if number.starts_with("SF") && !number.contains(':') {
            return "顺丰快递需要补充寄/收件人手机号后四位，格式：SF12345:0000".to_string();
        }
        match self.api.express(number).await {
            Ok(text) => text,
            Err(ApiError::Semantic(msg)) => {
                error!("快递查询失败，错误信息：{}", msg);
                format!("查询失败，{}", msg)
            }
            Err(e) => self.downgrade(&e, "快递查询失败"),
        }
    }

    async fn horoscope(&self, sign: &str) -> String {
        let slug = match zodiac_slug(sign) {
            Some(slug) => slug,
            None => return "请重新输入星座名称".to_string(),
        };
        match self.api.horoscope(slug).await {
            Ok(text) => text,
            Err(e) => {
                let message = if self.config.has_token() {
                    "星座获取信息获取失败，请检查 token 是否有误"
                } else {
                    "星座信息获取失败，可配置“alapi token”切换至 Alapi 服务，或者稍后再试"
                };
                self.downgrade(&e, message)
            }
        }
    }

    async fn hot_trends(&self, board: &str) -> String {
        let board_id = match hot_board_id(board.trim()) {
            Some(id) => id,
            None => return supported_boards_message(),
        };
        match self.api.hot_trends(board_id).await {
            Ok(text) => text,
            Err(e @ ApiError::Semantic(_)) => self.downgrade(&e, "热榜获取失败，请稍后再试"),
            Err(e) => self.downgrade(&e, "出错啦，稍后再试"),
        }
    }

    async fn dictionary(&self, word: &str) -> String {
        if !self.config.has_token() {
            return self.downgrade(&ApiError::Config, TOKEN_GUIDANCE);
        }
        match self.api.dictionary(word).await {
            Ok(text) => text,
            Err(ApiError::Semantic(msg)) => {
                error!("查询字典信息失败，API 返回错误：{}", msg);
                format!("查询字典信息失败，API 返回错误：{}", msg)
            }
            Err(e) => {
                error!("Failed to fetch word info: {}", e);
                format!("查询字典信息失败，错误信息：{}", e)
            }
        }
    }

    async fn gold_price(&self) -> String {
        if !self.config.has_token() {
            return self.downgrade(&ApiError::Config, TOKEN_GUIDANCE);
        }
        match self.api.gold_price().await {
            Ok(text) => text,
            Err(ApiError::Semantic(msg)) => {
                error!("获取黄金价格失败，API 返回错误：{}", msg);
                format!("获取黄金价格失败，API 返回错误：{}", msg)
            }
            Err(e) => {
                error!("Failed to fetch gold price: {}", e);
                format!("获取黄金价格失败，错误信息：{}", e)
            }
        }
    }

    async fn oil_price(&self, province: &str) -> String {
        if !self.config.has_token() {
            return self.downgrade(&ApiError::Config, TOKEN_GUIDANCE);
        }
        match self.api.oil_price(province).await {
            Ok(text) => text,
            Err(ApiError::Semantic(msg)) => {
                error!("获取油价信息失败，API 返回错误：{}", msg);
                format!("获取油价信息失败，API 返回错误：{}", msg)
            }
            Err(e) => {
                error!("Failed to fetch oil price: {}", e);
                format!("获取油价信息失败，错误信息：{}", e)
            }
        }
    }

    async fn weather(&self, city_or_id: &str, span_word: Option<&str>) -> String {
        if !self.config.has_token() {
            return self.downgrade(&ApiError::Config, TOKEN_GUIDANCE);
        }
        let span = WeatherSpan::from_keyword(span_word);
        let is_id = !city_or_id.is_empty() && city_or_id.chars().all(|c| c.is_ascii_digit());
        if !is_id {
            // numeric ids bypass the duplicate table entirely
            match CityTable::global().resolve(city_or_id) {
                CityResolution::Ambiguous(records) => {
                    let formatted: Vec<String> = records
                        .iter()
                        .enumerate()
                        .map(|(idx, r)| {
                            format!("{}) {}--{}, ID: {}", idx + 1, r.province, r.leader, r.city_id)
                        })
                        .collect();
                    return format!(
                        "查询 <{}> 具有多条数据：\n{}\n请使用id查询，发送“id天气”",
                        city_or_id,
                        formatted.join("\n")
                    );
                }
                CityResolution::Resolved(id) => return self.weather_by(id, span).await,
                CityResolution::NotFound => {}
            }
        }
        self.weather_by(city_or_id, span).await
    }

    async fn weather_by(&self, city_or_id: &str, span: WeatherSpan) -> String {
        match self.api.weather(city_or_id, span).await {
            Ok(text) => text,
            Err(ApiError::Semantic(msg)) => {
                error!("获取天气信息失败，API 返回错误：{}", msg);
                format!("获取天气信息失败，API 返回错误：{}", msg)
            }
            Err(e) => self.downgrade(&e, "获取天气信息失败"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apilot_fetch::FetchError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct StubFetch {
        responses: Vec<(&'static str, Result<Value, FetchError>)>,
        probe_ok: bool,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetch {
        fn new(responses: Vec<(&'static str, Result<Value, FetchError>)>) -> Self {
            Self {
                responses,
                probe_ok: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_probe(mut self, probe_ok: bool) -> Self {
            self.probe_ok = probe_ok;
            self
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

        fn total_calls(&self) -> usize {
            self.calls.lock().expect("lock").len()
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
            self.probe_ok
        }

        async fn download_image(&self, _url: &str) -> Option<PathBuf> {
            None
        }
    }

    fn config(token: Option<&str>) -> Config {
        Config {
            alapi_token: token.map(|t| t.to_string()),
            morning_news_text_enabled: false,
        }
    }

    fn build_plugin(cfg: Config, stub: StubFetch) -> (Apilot, Arc<StubFetch>) {
        let stub = Arc::new(stub);
        let plugin = Apilot::with_collaborators(cfg, stub.clone(), Box::new(NoRender));
        (plugin, stub)
    }

    #[tokio::test]
    async fn sf_number_without_phone_suffix_short_circuits_locally() {
        let (plugin, stub) = build_plugin(config(Some("tok")), StubFetch::new(vec![]));
        let reply = plugin.handle("快递SF12345").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::Text);
        assert_eq!(
            reply.content,
            "顺丰快递需要补充寄/收件人手机号后四位，格式：SF12345:0000"
        );
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn express_without_token_returns_configuration_guidance() {
        let (plugin, stub) = build_plugin(config(None), StubFetch::new(vec![]));
        let reply = plugin.handle("快递YT123").await.expect("routed");
        assert_eq!(reply.content, "请先配置alapi的token");
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn empty_express_number_prompts_usage_without_network() {
        let (plugin, stub) = build_plugin(config(Some("tok")), StubFetch::new(vec![]));
        let reply = plugin.handle("快递").await.expect("routed");
        assert!(reply.content.contains("追加运单号"));
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn express_envelope_failure_surfaces_provider_message() {
        let stub = StubFetch::new(vec![(
            "alapi.cn/api/kd",
            Ok(json!({"code": 400, "msg": "单号错误"})),
        )]);
        let (plugin, _stub) = build_plugin(config(Some("tok")), stub);
        let reply = plugin.handle("快递YT123").await.expect("routed");
        assert_eq!(reply.content, "查询失败，单号错误");
    }

    #[tokio::test]
    async fn morning_news_falls_back_to_image_url_when_render_declines() {
        let stub = StubFetch::new(vec![(
            "vvhan.com/api/60s",
            Ok(json!({
                "success": true,
                "time": "2024-05-01",
                "imgUrl": "https://img.example.com/60s.png",
                "data": ["头条一", "头条二", "【微语】日拱一卒。"]
            })),
        )]);
        let (plugin, _stub) = build_plugin(config(None), stub);
        let reply = plugin.handle("早报").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::ImageUrl);
        assert_eq!(reply.content, "https://img.example.com/60s.png");
    }

    #[tokio::test]
    async fn morning_news_text_mode_skips_rendering() {
        let stub = StubFetch::new(vec![(
            "vvhan.com/api/60s",
            Ok(json!({
                "success": true,
                "time": "2024-05-01",
                "data": ["头条一", "【微语】慢慢来。"]
            })),
        )]);
        let cfg = Config {
            alapi_token: None,
            morning_news_text_enabled: true,
        };
        let (plugin, _stub) = build_plugin(cfg, stub);
        let reply = plugin.handle("早报").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::Text);
        assert!(reply.content.contains("今日早报"));
        assert!(reply.content.contains("1. 头条一"));
    }

    struct FileRenderer(PathBuf);

    impl RenderText for FileRenderer {
        fn render(&self, _text: &str, _title: Option<&str>) -> Option<PathBuf> {
            std::fs::write(&self.0, b"img").ok()?;
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn morning_news_render_success_yields_image_file() {
        let path = std::env::temp_dir().join(format!("apilot-render-test-{}.png", std::process::id()));
        let stub = Arc::new(StubFetch::new(vec![(
            "vvhan.com/api/60s",
            Ok(json!({
                "success": true,
                "time": "2024-05-01",
                "data": ["头条一", "【微语】慢慢来。"]
            })),
        )]));
        let plugin = Apilot::with_collaborators(
            config(None),
            stub.clone(),
            Box::new(FileRenderer(path.clone())),
        );
        let reply = plugin.handle("早报").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::ImageFile);
        assert_eq!(reply.content, path.display().to_string());
        std::fs::remove_file(&path).expect("cleanup");
    }

    #[tokio::test]
    async fn unsupported_hot_board_lists_supported_boards_unchanged() {
        let (plugin, stub) = build_plugin(config(None), StubFetch::new(vec![]));
        let first = plugin.handle("随便热榜").await.expect("routed");
        let second = plugin.handle("不存在热榜").await.expect("routed");
        assert!(first.content.contains("已支持的类型有"));
        assert_eq!(first.content, second.content);
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn ambiguous_city_weather_enumerates_candidates_without_network() {
        let (plugin, stub) = build_plugin(config(Some("tok")), StubFetch::new(vec![]));
        let reply = plugin.handle("朝阳天气").await.expect("routed");
        assert!(reply.content.contains("查询 <朝阳> 具有多条数据："));
        assert!(reply.content.contains("101010300"));
        assert!(reply.content.contains("101071201"));
        assert!(reply.content.contains("101060110"));
        assert!(reply.content.contains("请使用id查询"));
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn numeric_city_id_bypasses_disambiguation() {
        let stub = StubFetch::new(vec![(
            "alapi.cn/api/tianqi",
            Ok(json!({"success": true, "data": {
                "city": "朝阳", "province": "辽宁",
                "update_time": "2024-05-01 08:00:00",
                "weather": "晴", "temp": "20", "min_temp": "12", "max_temp": "24",
                "wind": "西北风", "wind_speed": "2级", "humidity": "40%",
                "sunrise": "05:00", "sunset": "18:50",
                "air": "30", "air_pm25": "12"
            }})),
        )]);
        let (plugin, stub) = build_plugin(config(Some("tok")), stub);
        let reply = plugin.handle("101071201天气").await.expect("routed");
        assert!(reply.content.contains("🏙️ 城市: 朝阳 (辽宁)"));
        assert_eq!(stub.calls_containing("tianqi"), 1);
    }

    #[tokio::test]
    async fn moyu_fallback_hits_qqsuu_once_then_weekend_message() {
        let stub = StubFetch::new(vec![
            (
                "vvhan.com/api/moyu",
                Ok(json!({"success": false, "message": "down"})),
            ),
            (
                "qqsuu.cn/moyuribao",
                Ok(json!({"code": 200, "data": "https://img.example.com/moyu.png"})),
            ),
        ]);
        let (plugin, stub) = build_plugin(config(None), stub);
        let reply = plugin.handle("摸鱼").await.expect("routed");
        // probe declines, so the qqsuu route reads as the weekend gap
        assert_eq!(reply.content, "周末无需摸鱼，愉快玩耍吧");
        assert_eq!(stub.calls_containing("vvhan.com/api/moyu"), 1);
        assert_eq!(stub.calls_containing("qqsuu.cn/moyuribao"), 1);
    }

    #[tokio::test]
    async fn moyu_video_with_live_url_replies_video_url() {
        let stub = StubFetch::new(vec![(
            "qqsuu.cn/moyuribaoshipin",
            Ok(json!({"code": 200, "data": "https://v.example.com/moyu.mp4"})),
        )])
        .with_probe(true);
        let (plugin, _stub) = build_plugin(config(None), stub);
        let reply = plugin.handle("摸鱼视频").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::VideoUrl);
        assert_eq!(reply.content, "https://v.example.com/moyu.mp4");
    }

    #[tokio::test]
    async fn gossip_with_dead_image_reads_as_weekend_gap() {
        let stub = StubFetch::new(vec![(
            "qqsuu.cn/mingxingbagua",
            Ok(json!({"code": 200, "data": "https://img.example.com/bagua.jpg"})),
        )]);
        let (plugin, _stub) = build_plugin(config(None), stub);
        let reply = plugin.handle("八卦").await.expect("routed");
        assert_eq!(reply.kind, ReplyKind::Text);
        assert_eq!(reply.content, "周末不更新，请微博吃瓜");
    }

    #[tokio::test]
    async fn unknown_zodiac_word_asks_for_valid_sign() {
        let (plugin, stub) = build_plugin(config(None), StubFetch::new(vec![]));
        let reply = plugin.handle("龙王座").await.expect("routed");
        assert_eq!(reply.content, "请重新输入星座名称");
        assert_eq!(stub.total_calls(), 0);
    }

    #[tokio::test]
    async fn unmatched_text_falls_through_to_host() {
        let (plugin, _stub) = build_plugin(config(None), StubFetch::new(vec![]));
        assert!(plugin.handle("你好").await.is_none());
    }

    #[test]
    fn help_text_has_short_and_verbose_forms() {
        let (plugin, _stub) = build_plugin(config(None), StubFetch::new(vec![]));
        assert!(plugin.help_text(false).contains("发送特定指令"));
        let verbose = plugin.help_text(true);
        assert!(verbose.contains("📚"));
        assert!(verbose.contains("快递"));
    }
}
