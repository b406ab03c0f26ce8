//! Per-category response formatting.
//!
//! Pure mappings from a validated provider payload to display text. A
//! missing expected field is an [`ApiError::Format`], never a panic; data
//! that is present but empty formats to the category's guidance text.

use crate::ApiError;
use chrono::{Duration, NaiveDateTime};
use serde_json::Value;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Morning-news digest ready for rendering: list text plus the provider's
/// own image URL as the fallback medium.
#[derive(Debug, Clone)]
pub struct MorningDigest {
    pub title: String,
    pub text: String,
    pub image_url: Option<String>,
}

fn field<'a>(payload: &'a Value, key: &str) -> Result<&'a Value, ApiError> {
    match payload.get(key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(ApiError::Format(key.to_string())),
    }
}

fn array_field<'a>(payload: &'a Value, key: &str) -> Result<&'a Vec<Value>, ApiError> {
    field(payload, key)?
        .as_array()
        .ok_or_else(|| ApiError::Format(key.to_string()))
}

/// Scalar rendered for display; providers switch between strings and bare
/// numbers for the same field.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_field(payload: &Value, key: &str) -> Result<String, ApiError> {
    Ok(display(field(payload, key)?))
}

pub(crate) fn string_field(payload: &Value, key: &str) -> Result<String, ApiError> {
    text_field(payload, key)
}

pub fn vvhan_morning_digest(payload: &Value) -> Result<MorningDigest, ApiError> {
    let items = array_field(payload, "data")?;
    if items.is_empty() {
        return Err(ApiError::Format("data".to_string()));
    }
    // last element is the daily aphorism, the rest are headlines
    let news: Vec<String> = items[..items.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, display(item)))
        .collect();
    let weiyu = display(&items[items.len() - 1]).trim().to_string();
    let date = payload
        .get("time")
        .or_else(|| payload.get("date"))
        .map(display)
        .unwrap_or_default();
    let image_url = payload
        .get("imgUrl")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(MorningDigest {
        title: format!("☕ {}  今日早报", date),
        text: format!("{}\n\n{}", news.join("\n"), weiyu),
        image_url,
    })
}

pub fn alapi_morning_digest(payload: &Value) -> Result<MorningDigest, ApiError> {
    let data = field(payload, "data")?;
    let news: Vec<String> = array_field(data, "news")?
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, display(item)))
        .collect();
    let date = text_field(data, "date")?;
    let weiyu = text_field(data, "weiyu")?;
    let image_url = data
        .get("image")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(MorningDigest {
        title: format!("☕ {}  今日早报", date),
        text: format!("{}\n\n{}", news.join("\n"), weiyu),
        image_url,
    })
}

pub fn vvhan_horoscope(payload: &Value) -> Result<String, ApiError> {
    let data = field(payload, "data")?;
    let todo = field(data, "todo")?;
    let index = field(data, "index")?;
    let fortune = field(data, "fortunetext")?;
    Ok(format!(
        "{} ({}):\n\n\
         💡【每日建议】\n宜：{}\n忌：{}\n\n\
         📊【运势指数】\n总运势：{}\n爱情：{}\n工作：{}\n财运：{}\n健康：{}\n\n\
         🍀【幸运提示】\n数字：{}\n颜色：{}\n星座：{}\n\n\
         ✍【简评】\n{}\n\n\
         📜【详细运势】\n总运：{}\n爱情：{}\n工作：{}\n财运：{}\n健康：{}\n",
        text_field(data, "title")?,
        text_field(data, "time")?,
        text_field(todo, "yi")?,
        text_field(todo, "ji")?,
        text_field(index, "all")?,
        text_field(index, "love")?,
        text_field(index, "work")?,
        text_field(index, "money")?,
        text_field(index, "health")?,
        text_field(data, "luckynumber")?,
        text_field(data, "luckycolor")?,
        text_field(data, "luckyconstellation")?,
        text_field(data, "shortcomment")?,
        text_field(fortune, "all")?,
        text_field(fortune, "love")?,
        text_field(fortune, "work")?,
        text_field(fortune, "money")?,
        text_field(fortune, "health")?,
    ))
}

pub fn alapi_horoscope(payload: &Value) -> Result<String, ApiError> {
    let data = field(field(payload, "data")?, "day")?;
    Ok(format!(
        "📅 日期：{}\n\n\
         💡【每日建议】\n宜：{}\n忌：{}\n\n\
         📊【运势指数】\n总运势：{}\n爱情：{}\n工作：{}\n财运：{}\n健康：{}\n\n\
         🔔【提醒】：{}\n\n\
         🍀【幸运提示】\n数字：{}\n颜色：{}\n星座：{}\n\n\
         ✍【简评】\n总运：{}\n爱情：{}\n工作：{}\n财运：{}\n健康：{}\n",
        text_field(data, "date")?,
        text_field(data, "yi")?,
        text_field(data, "ji")?,
        text_field(data, "all")?,
        text_field(data, "love")?,
        text_field(data, "work")?,
        text_field(data, "money")?,
        text_field(data, "health")?,
        text_field(data, "notice")?,
        text_field(data, "lucky_number")?,
        text_field(data, "lucky_color")?,
        text_field(data, "lucky_star")?,
        text_field(data, "all_text")?,
        text_field(data, "love_text")?,
        text_field(data, "work_text")?,
        text_field(data, "money_text")?,
        text_field(data, "health_text")?,
    ))
}

pub fn hot_trends_list(payload: &Value) -> Result<String, ApiError> {
    let topics = array_field(payload, "data")?;
    let mut output = Vec::new();
    output.push(format!("更新时间：{}\n", text_field(payload, "update_time")?));
    for (i, topic) in topics.iter().take(15).enumerate() {
        let hot = match topic.get("hot") {
            Some(value) if !value.is_null() => display(value),
            _ => "无热度参数, 0".to_string(),
        };
        output.push(format!(
            "{}. {} ({} 浏览)\nURL: {}\n",
            i + 1,
            text_field(topic, "title")?,
            hot,
            text_field(topic, "url")?,
        ));
    }
    Ok(output.join("\n"))
}

/// `"2024-05-01 10:11:22"` → `"05-01 10:11"`; anything shorter passes
/// through untouched.
fn trim_trace_time(time: &str) -> &str {
    if time.is_ascii() && time.len() >= 8 {
        &time[5..time.len() - 3]
    } else {
        time
    }
}

pub fn express_trace(payload: &Value) -> Result<String, ApiError> {
    let data = field(payload, "data")?;
    let mut lines = vec![
        format!("快递编号：{}", text_field(data, "nu")?),
        format!("快递公司：{}", text_field(data, "com")?),
        format!("状态：{}", text_field(data, "status_desc")?),
        "状态信息：".to_string(),
    ];
    for info in array_field(data, "info")? {
        let time = text_field(info, "time")?;
        lines.push(format!(
            "{} - {}\n    {}",
            trim_trace_time(&time),
            text_field(info, "status_desc")?,
            text_field(info, "content")?,
        ));
    }
    Ok(lines.join("\n"))
}

pub fn word_entry(payload: &Value, word: &str) -> Result<String, ApiError> {
    let data = array_field(payload, "data")?;
    let entry = match data.first() {
        Some(entry) => entry,
        None => return Ok(format!("未找到 {} 的字典信息", word)),
    };
    Ok(format!(
        "字: {}\n拼音: {}\n笔画: {}\n部首: {}\n释义: {}\n",
        text_field(entry, "word")?,
        text_field(entry, "pinyin")?,
        text_field(entry, "strokes")?,
        text_field(entry, "radical")?,
        text_field(entry, "explanation")?,
    ))
}

pub fn gold_quotes(payload: &Value) -> Result<String, ApiError> {
    let data = array_field(payload, "data")?;
    if data.is_empty() {
        return Ok("获取黄金价格失败，返回数据为空".to_string());
    }
    let quotes: Result<Vec<String>, ApiError> = data
        .iter()
        .map(|item| {
            Ok(format!(
                "名称: {}\n买入价: {} 元\n卖出价: {} 元\n最高价: {} 元\n最低价: {} 元\n",
                text_field(item, "name")?,
                text_field(item, "buy_price")?,
                text_field(item, "sell_price")?,
                text_field(item, "high_price")?,
                text_field(item, "low_price")?,
            ))
        })
        .collect();
    Ok(quotes?.join("\n"))
}

pub fn oil_quotes(payload: &Value, province: &str) -> Result<String, ApiError> {
    let data = array_field(payload, "data")?;
    if data.is_empty() {
        return Ok("获取油价信息失败，返回数据为空".to_string());
    }
    for item in data {
        if item.get("province").and_then(Value::as_str) == Some(province) {
            return Ok(format!(
                "省份: {}\n89号汽油: {} 元/升\n92号汽油: {} 元/升\n95号汽油: {} 元/升\n98号汽油: {} 元/升\n0号柴油: {} 元/升\n",
                text_field(item, "province")?,
                text_field(item, "o89")?,
                text_field(item, "o92")?,
                text_field(item, "o95")?,
                text_field(item, "o98")?,
                text_field(item, "o0")?,
            ));
        }
    }
    Ok(format!("未找到 {} 的油价信息", province))
}

fn aqi_value(aqi: &Value, key: &str) -> String {
    match aqi.get(key) {
        Some(value) if !value.is_null() => display(value),
        _ => "N/A".to_string(),
    }
}

/// Realtime weather card: conditions, life indices, the next ten hours of
/// the hourly forecast, AQI detail, and any active alarms.
pub fn weather_now(data: &Value) -> Result<String, ApiError> {
    let update_time = text_field(data, "update_time")?;
    let current_time = NaiveDateTime::parse_from_str(&update_time, DATETIME_FORMAT)
        .map_err(|_| ApiError::Format("update_time".to_string()))?;

    let mut formatted_output = Vec::new();
    formatted_output.push(format!(
        "🏙️ 城市: {} ({})\n\
         🕒 更新时间: {}\n\
         🌤️ 天气: {}\n\
         🌡️ 温度: 当前 {}℃, 最低 {}℃, 最高 {}℃\n\
         🌬️ 风向: {}, 风速: {}\n\
         💧 湿度: {}\n\
         🌅 日出/日落: {} / {}\n\
         😷 空气质量: {} (PM2.5: {})\n",
        text_field(data, "city")?,
        text_field(data, "province")?,
        current_time.format("%m-%d %H:%M"),
        text_field(data, "weather")?,
        text_field(data, "temp")?,
        text_field(data, "min_temp")?,
        text_field(data, "max_temp")?,
        text_field(data, "wind")?,
        text_field(data, "wind_speed")?,
        text_field(data, "humidity")?,
        text_field(data, "sunrise")?,
        text_field(data, "sunset")?,
        text_field(data, "air")?,
        text_field(data, "air_pm25")?,
    ));

    let mut index_info = String::from("💡 生活指数:\n");
    if let Some(indices) = data.get("index").and_then(Value::as_array) {
        for index in indices {
            index_info.push_str(&format!(
                "  - {}: {} ({})\n",
                text_field(index, "name")?,
                text_field(index, "level")?,
                text_field(index, "content")?,
            ));
        }
    }
    formatted_output.push(index_info);

    let mut future_weather_info = String::from("⏳ 未来 10 小时天气预报:\n");
    let ten_hours_later = current_time + Duration::hours(10);
    if let Some(hours) = data.get("hour").and_then(Value::as_array) {
        for hour_data in hours {
            let time = text_field(hour_data, "time")?;
            if let Ok(forecast_time) = NaiveDateTime::parse_from_str(&time, DATETIME_FORMAT) {
                if forecast_time >= current_time && forecast_time <= ten_hours_later {
                    future_weather_info.push_str(&format!(
                        "  - {} - {} - {}℃\n",
                        forecast_time.format("%H:%M"),
                        text_field(hour_data, "wea")?,
                        text_field(hour_data, "temp")?,
                    ));
                }
            }
        }
    }
    formatted_output.push(future_weather_info);

    let empty = Value::Null;
    let aqi = data.get("aqi").unwrap_or(&empty);
    let mut aqi_info = String::from("😷 空气质量详细信息:\n");
    aqi_info.push_str(&format!(
        "  - 空气质量指数: {} ({})\n",
        aqi_value(aqi, "air"),
        aqi_value(aqi, "air_level"),
    ));
    aqi_info.push_str(&format!("  - PM2.5: {}\n", aqi_value(aqi, "pm25")));
    aqi_info.push_str(&format!("  - PM10: {}\n", aqi_value(aqi, "pm10")));
    aqi_info.push_str(&format!("  - CO: {}\n", aqi_value(aqi, "co")));
    aqi_info.push_str(&format!("  - NO2: {}\n", aqi_value(aqi, "no2")));
    aqi_info.push_str(&format!("  - SO2: {}\n", aqi_value(aqi, "so2")));
    aqi_info.push_str(&format!("  - O3: {}\n", aqi_value(aqi, "o3")));
    aqi_info.push_str(&format!("  - 建议: {}\n", aqi_value(aqi, "air_tips")));
    formatted_output.push(aqi_info);

    if let Some(alarms) = data.get("alarm").and_then(Value::as_array) {
        if !alarms.is_empty() {
            let mut alarm_info = String::from("⚠️ 预警信息:\n");
            for alarm in alarms {
                alarm_info.push_str(&format!(
                    "🔴 标题: {}\n🟠 等级: {}\n🟡 类型: {}\n🟢 提示: \n{}\n🔵 内容: \n{}\n\n",
                    text_field(alarm, "title")?,
                    text_field(alarm, "level")?,
                    text_field(alarm, "type")?,
                    text_field(alarm, "tips")?,
                    text_field(alarm, "content")?,
                ));
            }
            formatted_output.push(alarm_info);
        }
    }

    Ok(formatted_output.join("\n"))
}

/// Seven-day forecast; 明天/后天 narrow the listing to the matching day.
pub fn weather_seven(data: &Value, span: crate::WeatherSpan) -> Result<String, ApiError> {
    let days = data
        .as_array()
        .ok_or_else(|| ApiError::Format("data".to_string()))?;
    let mut formatted_output = Vec::new();
    for (num, day) in days.iter().enumerate() {
        if num == 0 {
            formatted_output.push(format!(
                "🏙️ 城市: {} ({})\n",
                text_field(day, "city")?,
                text_field(day, "province")?,
            ));
        }
        if span == crate::WeatherSpan::Tomorrow && num != 1 {
            continue;
        }
        if span == crate::WeatherSpan::DayAfter && num != 2 {
            continue;
        }
        let mut basic_info = vec![
            format!("🕒 日期: {}", text_field(day, "date")?),
            format!(
                "🌥️ 天气: 🌤️{}| 🌙{}",
                text_field(day, "wea_day")?,
                text_field(day, "wea_night")?,
            ),
            format!(
                "🌡️ 温度: 🌤️{}℃| 🌙{}℃",
                text_field(day, "temp_day")?,
                text_field(day, "temp_night")?,
            ),
            format!(
                "🌅 日出/日落: {} / {}",
                text_field(day, "sunrise")?,
                text_field(day, "sunset")?,
            ),
        ];
        if let Some(indices) = day.get("index").and_then(Value::as_array) {
            for index in indices {
                basic_info.push(format!(
                    "{}: {}",
                    text_field(index, "name")?,
                    text_field(index, "level")?,
                ));
            }
        }
        formatted_output.push(format!("{}\n", basic_info.join("\n")));
    }
    Ok(formatted_output.join("\n"))
}
