use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateShortUrlPayload {
    pub url: Option<String>,
    /// Validity in minutes; fractional minutes are truncated
    #[serde(default, deserialize_with = "deserialize_whole_minutes")]
    pub validity: Option<i64>,
    pub shortcode: Option<String>,
}

#[allow(clippy::cast_possible_truncation)]
fn deserialize_whole_minutes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    // NOTE: `as` saturates, so huge values still fail later as out of range
    Ok(Option::<f64>::deserialize(deserializer)?.map(|minutes| minutes.trunc() as i64))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedShortUrl {
    pub short_link: String,
    /// Timestamp in ISO-8601 format
    pub expiry: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlStats {
    pub total_clicks: usize,
    pub original_url: String,
    /// Timestamp in ISO-8601 format
    pub creation_date: String,
    /// Timestamp in ISO-8601 format
    pub expiry_date: String,
    pub click_details: Vec<ClickDetail>,
}

#[derive(Debug, Serialize)]
pub struct ClickDetail {
    /// Timestamp in ISO-8601 format
    pub timestamp: String,
    pub referrer: String,
    pub location: String,
}

#[derive(Debug)]
pub struct Redirect {
    pub url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    pub error: String,
    pub error_id: String,
}
