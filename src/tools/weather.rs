//! Current-weather lookup against an OpenWeatherMap-compatible endpoint.
//!
//! `GET {base_url}?q=<location>&appid=<key>&units=<units>`. A 200 response is
//! summarized into one line; anything else becomes a failed result carrying
//! the HTTP status and the provider's `message`.

use serde::Deserialize;

use crate::config::{Units, WeatherToolConfig};
use crate::models::{ToolKind, ToolResult};
use crate::tools::ToolAdapter;

#[derive(Debug, Deserialize)]
pub struct WeatherReport {
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: Readings,
    #[serde(default)]
    pub wind: Wind,
}

#[derive(Debug, Deserialize)]
pub struct Condition {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct Readings {
    pub temp: f64,
    pub humidity: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

/// Renders a report in the configured unit system.
pub fn format_report(location: &str, report: &WeatherReport, units: Units) -> String {
    let description = report
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or("unknown conditions");
    format!(
        "Current weather in {}: {}. Temperature: {}{}, humidity: {}%, wind speed: {}{}.",
        location,
        description,
        report.main.temp,
        units.temperature_suffix(),
        report.main.humidity,
        report.wind.speed,
        units.speed_suffix()
    )
}

pub struct WeatherLookup {
    config: WeatherToolConfig,
}

impl WeatherLookup {
    pub fn new(config: WeatherToolConfig) -> Self {
        Self { config }
    }

    fn fetch(&self, location: &str) -> Result<String, String> {
        let client = reqwest::blocking::Client::new();
        let response = client
            .get(&self.config.base_url)
            .query(&[
                ("q", location),
                ("appid", self.config.api_key.as_str()),
                ("units", self.config.units.as_str()),
            ])
            .send()
            .map_err(|e| format!("weather request error: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| format!("weather response error: {}", e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ProviderError>(&body)
                .map(|e| e.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(format!(
                "weather lookup failed (HTTP {}): {}",
                status.as_u16(),
                message
            ));
        }

        let report: WeatherReport = serde_json::from_str(&body)
            .map_err(|e| format!("unexpected weather response: {}", e))?;
        Ok(format_report(location, &report, self.config.units))
    }
}

impl ToolAdapter for WeatherLookup {
    fn kind(&self) -> ToolKind {
        ToolKind::Weather
    }

    fn description(&self) -> &str {
        "Look up the current weather for a city"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn invoke(&self, argument: &str) -> ToolResult {
        if !self.config.enabled {
            return ToolResult::failed(ToolKind::Weather, "weather lookup is disabled");
        }
        if self.config.api_key.trim().is_empty() {
            return ToolResult::failed(
                ToolKind::Weather,
                "weather API key is not configured (set [tools.weather] api_key)",
            );
        }
        let location = argument.trim();
        if location.is_empty() {
            return ToolResult::failed(ToolKind::Weather, "no location given");
        }

        match self.fetch(location) {
            Ok(text) => ToolResult::ok(ToolKind::Weather, text),
            Err(reason) => ToolResult::failed(ToolKind::Weather, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WeatherReport {
        serde_json::from_str(
            r#"{"weather":[{"description":"light rain"}],"main":{"temp":21.5,"humidity":80},"wind":{"speed":3.2},"name":"Hangzhou"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_format_report_metric() {
        let text = format_report("杭州市", &sample(), Units::Metric);
        assert_eq!(
            text,
            "Current weather in 杭州市: light rain. Temperature: 21.5°C, humidity: 80%, wind speed: 3.2m/s."
        );
    }

    #[test]
    fn test_format_report_imperial_units() {
        let text = format_report("Boston", &sample(), Units::Imperial);
        assert!(text.contains("21.5°F"));
        assert!(text.contains("3.2mph"));
    }

    #[test]
    fn test_missing_key_fails_without_io() {
        let config = WeatherToolConfig {
            base_url: "http://127.0.0.1:9/unreachable".to_string(),
            ..WeatherToolConfig::default()
        };
        let result = WeatherLookup::new(config).invoke("杭州市");
        assert!(!result.success);
        assert!(result.result_text.contains("API key"));
    }

    #[test]
    fn test_disabled_fails_immediately() {
        let config = WeatherToolConfig {
            enabled: false,
            api_key: "k".into(),
            ..WeatherToolConfig::default()
        };
        let result = WeatherLookup::new(config).invoke("杭州市");
        assert!(!result.success);
        assert!(result.result_text.contains("disabled"));
    }
}
