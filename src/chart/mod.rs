//! Birth chart data: request building, the astrology API client, and the
//! local store that keeps one reading per user.

mod client;
mod repository;
mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AstroLiveError;
use crate::live::ChartContext;
use crate::Result;

pub use client::{ChartApiClient, ChartApiSettings, ChartProvider, DEFAULT_CHART_API_URL};
pub use repository::ChartRepository;
pub use store::LocalStore;

/// Timezone offset in hours used when none is given (Nepal).
pub const DEFAULT_TIMEZONE: f64 = 5.75;

/// The charts fetched for every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    /// Planetary positions, the birth chart (D1).
    Planets,
    /// Navamsa chart (D9).
    Navamsa,
    /// Vimshottari maha dasha periods.
    Dasha,
}

impl ChartKind {
    /// Every chart kind, in fetch order.
    pub const ALL: [ChartKind; 3] = [ChartKind::Planets, ChartKind::Navamsa, ChartKind::Dasha];

    /// API path relative to the base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ChartKind::Planets => "planets",
            ChartKind::Navamsa => "navamsa-chart-info",
            ChartKind::Dasha => "vimsottari/maha-dasas",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartKind::Planets => write!(f, "birth chart (D1)"),
            ChartKind::Navamsa => write!(f, "navamsa chart (D9)"),
            ChartKind::Dasha => write!(f, "dasha periods"),
        }
    }
}

/// Body posted to the astrology API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub year: i32,
    pub month: u32,
    pub date: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: f64,
}

/// Birth details as entered by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct BirthDetails {
    pub name: String,
    /// `DD/MM/YYYY`.
    pub date: String,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub place: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Offset from UTC in hours.
    pub timezone: f64,
}

impl BirthDetails {
    /// Build the API request.
    ///
    /// The date must have three `/`-separated parts. A part that is not a
    /// number falls back to day 1, month 1 or year 2000.
    pub fn to_request(&self) -> Result<ChartRequest> {
        let parts: Vec<&str> = self.date.trim().split('/').collect();
        if parts.len() != 3 {
            return Err(AstroLiveError::InvalidBirthDate(self.date.clone()));
        }

        Ok(ChartRequest {
            year: parts[2].trim().parse().unwrap_or(2000),
            month: parts[1].trim().parse().unwrap_or(1),
            date: parts[0].trim().parse().unwrap_or(1),
            hours: self.hours,
            minutes: self.minutes,
            seconds: self.seconds,
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
        })
    }

    /// Birth time as `HH:MM:SS`.
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }

    /// Stored profile for these details with a fresh id.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            birth_date: self.date.clone(),
            birth_time: self.time_string(),
            place: self.place.clone(),
            created_at: Utc::now(),
        }
    }
}

/// A stored birth profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub name: String,
    pub birth_date: String,
    pub birth_time: String,
    pub place: String,
    pub created_at: DateTime<Utc>,
}

/// The three chart blobs stored for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartReading {
    /// Unique key.
    pub username: String,
    pub d1_data: String,
    pub d9_data: String,
    pub dasha_data: String,
    pub timestamp: DateTime<Utc>,
}

impl ChartReading {
    /// Context handed to a live session.
    pub fn to_context(&self) -> ChartContext {
        ChartContext {
            d1: Some(self.d1_data.clone()),
            d9: Some(self.d9_data.clone()),
            dasha: Some(self.dasha_data.clone()),
        }
    }
}
