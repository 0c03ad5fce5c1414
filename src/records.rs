use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AreaRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Valve {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub size: String,
    pub full_open_condition: f64,
    pub current_condition: f64,
    #[serde(default)]
    pub mid_point: Option<f64>,
    #[serde(default)]
    pub steepness: Option<f64>,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub previous_position: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub area_image: Option<String>,
    #[serde(default)]
    pub area: Option<AreaRef>,
}

impl Valve {
    pub fn opening_percentage(&self) -> f64 {
        opening_percentage(
            self.current_condition,
            self.full_open_condition,
            self.mid_point.unwrap_or(0.0),
            self.steepness.unwrap_or(0.0),
        )
    }

    pub fn area_name(&self) -> &str {
        self.area.as_ref().map(|a| a.name.as_str()).unwrap_or("No Area")
    }

    /// Google Maps link for the valve position, when both coordinates are known.
    pub fn map_url(&self) -> Option<String> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(format!("https://www.google.com/maps?q={lat},{lng}")),
            _ => None,
        }
    }
}

fn or_default(v: f64, default: f64) -> f64 {
    if v.is_finite() && v != 0.0 {
        v
    } else {
        default
    }
}

/// Logistic estimate of how far a valve is open, in percent with one decimal.
///
/// Zero or non-finite inputs fall back to current 0, full open 100,
/// mid point 0.5 and steepness 12.5.
pub fn opening_percentage(current: f64, full_open: f64, mid_point: f64, steepness: f64) -> f64 {
    let n = if current.is_finite() { current } else { 0.0 };
    let full = or_default(full_open, 100.0);
    let k = or_default(steepness, 12.5);
    let x0 = or_default(mid_point, 0.5);
    let exponent = -k * (n / full - x0);
    let denominator = 1.0 + exponent.exp();
    let pct = if denominator.is_finite() && denominator != 0.0 {
        100.0 / denominator
    } else {
        0.0
    };
    let clamped = pct.clamp(0.0, 100.0);
    (clamped * 10.0).round() / 10.0
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ValveLog {
    pub id: i64,
    pub valve: i64,
    #[serde(default)]
    pub user: Option<i64>,
    pub changed_field: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
    pub timestamp: DateTime<Utc>,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%d/%m/%Y, %H:%M:%S")
        .to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    AssistantEngineer,
    Fo,
    SiteInspector,
    Completed,
}

impl ConversionStatus {
    pub const ALL: [ConversionStatus; 4] = [
        ConversionStatus::AssistantEngineer,
        ConversionStatus::Fo,
        ConversionStatus::SiteInspector,
        ConversionStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConversionStatus::AssistantEngineer => "assistant_engineer",
            ConversionStatus::Fo => "fo",
            ConversionStatus::SiteInspector => "site_inspector",
            ConversionStatus::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConversionStatus::AssistantEngineer => "Assistant Engineer",
            ConversionStatus::Fo => "FO",
            ConversionStatus::SiteInspector => "Site Inspector",
            ConversionStatus::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Conversion {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub file_number: String,
    #[serde(default)]
    pub area: Option<i64>,
    pub from_connection_type: i64,
    pub to_connection_type: i64,
    pub status: ConversionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub from_connection_type_detail: Option<ConnectionType>,
    #[serde(default)]
    pub to_connection_type_detail: Option<ConnectionType>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Area {
    pub id: i64,
    pub area_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConnectionType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RoleRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub role: Option<RoleRef>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct PagePermission {
    pub page: String,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_add: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Role {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<PagePermission>,
}
