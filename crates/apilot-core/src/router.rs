//! Keyword rule table: ordered regex matchers with capture extraction.

use regex::{Captures, Regex};

/// A recognized keyword command with its extracted arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MorningNews,
    MoyuCalendar,
    MoyuVideo,
    Gossip,
    Express { number: String },
    Horoscope { sign: String },
    HotTrends { board: String },
    Dictionary { word: String },
    GoldPrice,
    OilPrice { province: String },
    Weather {
        city_or_id: String,
        span_word: Option<String>,
    },
}

#[derive(Debug, Clone, Copy)]
enum RuleTag {
    MorningNews,
    MoyuCalendar,
    MoyuVideo,
    Gossip,
    Express,
    Horoscope,
    HotTrends,
    Dictionary,
    GoldPrice,
    OilPrice,
    Weather,
}

struct Rule {
    pattern: Regex,
    tag: RuleTag,
}

fn rule(pattern: &str, tag: RuleTag) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        tag,
    }
}

/// Ordered rule table; built once, immutable afterwards. The list order
/// encodes priority: the first matching rule wins and later rules are
/// never consulted.
pub struct Router {
    rules: Vec<Rule>,
}

impl Router {
    pub fn new() -> Self {
        let rules = vec![
            rule(r"^早报$", RuleTag::MorningNews),
            rule(r"^摸鱼$", RuleTag::MoyuCalendar),
            rule(r"^摸鱼视频$", RuleTag::MoyuVideo),
            rule(r"^八卦$", RuleTag::Gossip),
            rule(r"^快递(.*)$", RuleTag::Express),
            rule(r"^([\u{4e00}-\u{9fa5}]{2}座)$", RuleTag::Horoscope),
            rule(r"(.{1,6})热榜$", RuleTag::HotTrends),
            rule(r"^查字典\s+(.+)$", RuleTag::Dictionary),
            rule(r"^黄金$", RuleTag::GoldPrice),
            rule(r"^(.{2,7}?)(?:省|市)?油价$", RuleTag::OilPrice),
            rule(
                r"^(?:(.{2,7}?)(?:市|县|区|镇)?|(\d{7,9}))(:?今天|明天|后天|7天|七天)?(?:的)?天气$",
                RuleTag::Weather,
            ),
        ];
        Self { rules }
    }

    /// First-match-wins routing over the rule table. `None` means no rule
    /// recognized the input and the caller should fall through.
    pub fn route(&self, text: &str) -> Option<Command> {
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(text) {
                return Some(extract(rule.tag, &caps));
            }
        }
        None
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn capture(caps: &Captures, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn extract(tag: RuleTag, caps: &Captures) -> Command {
    match tag {
        RuleTag::MorningNews => Command::MorningNews,
        RuleTag::MoyuCalendar => Command::MoyuCalendar,
        RuleTag::MoyuVideo => Command::MoyuVideo,
        RuleTag::Gossip => Command::Gossip,
        RuleTag::Express => Command::Express {
            // full-width colon from Chinese input methods is normalized
            number: capture(caps, 1).trim().replace('：', ":"),
        },
        RuleTag::Horoscope => Command::Horoscope {
            sign: capture(caps, 1),
        },
        RuleTag::HotTrends => Command::HotTrends {
            board: capture(caps, 1).trim().to_string(),
        },
        RuleTag::Dictionary => Command::Dictionary {
            word: capture(caps, 1),
        },
        RuleTag::GoldPrice => Command::GoldPrice,
        RuleTag::OilPrice => Command::OilPrice {
            province: capture(caps, 1),
        },
        RuleTag::Weather => {
            let city_or_id = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let span_word = caps.get(3).map(|m| m.as_str().to_string());
            Command::Weather {
                city_or_id,
                span_word,
            }
        }
    }
}
