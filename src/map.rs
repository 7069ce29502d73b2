//! Plotly `scattermapbox` figure built from a [`Dataset`].
//!
//! The figure mirrors what Plotly Express emits for a scatter map colored by
//! a categorical column: one trace per status in order of first appearance,
//! a mapbox layout centered on the mean coordinate, and a legend titled after
//! the column. The browser renders it with `Plotly.newPlot`.

use crate::dataset::Dataset;
use crate::types::TrafficStatus;
use serde::Serialize;

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;

const FALLBACK_COLOR: &str = "gray";

/// Fixed status → marker color table.
pub fn status_color(status: &TrafficStatus) -> &'static str {
    match status {
        TrafficStatus::FreeFlow => "green",
        TrafficStatus::Heavy => "orange",
        TrafficStatus::Congested => "red",
        TrafficStatus::Unknown | TrafficStatus::Other(_) => FALLBACK_COLOR,
    }
}

#[derive(Debug, Clone)]
pub struct MapSettings {
    pub title: String,
    pub zoom: f64,
    pub height: u32,
    pub style: String,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            title: "Real-time traffic".to_string(),
            zoom: 10.0,
            height: 500,
            style: "carto-positron".to_string(),
        }
    }
}

// ---------- Figure document ----------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MapFigure {
    pub data: Vec<ScatterMapboxTrace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScatterMapboxTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub name: String,
    pub legendgroup: String,
    pub showlegend: bool,
    pub subplot: &'static str,
    pub hovertemplate: String,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub marker: Marker,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Marker {
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Layout {
    pub title: Text,
    pub height: u32,
    pub mapbox: Mapbox,
    pub legend: Legend,
    pub margin: Margin,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Text {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Mapbox {
    pub style: String,
    pub zoom: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Center>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Legend {
    pub title: Text,
    pub tracegroupgap: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Margin {
    pub t: u32,
}

impl MapFigure {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------- Renderer ----------

#[derive(Debug, Clone, Default)]
pub struct MapRenderer {
    settings: MapSettings,
}

impl MapRenderer {
    pub fn new(mut settings: MapSettings) -> Self {
        settings.zoom = settings.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        Self { settings }
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn render(&self, dataset: &Dataset) -> MapFigure {
        let mut traces: Vec<ScatterMapboxTrace> = Vec::new();

        for r in dataset.iter() {
            let label = r.traffic.as_str();
            let idx = match traces.iter().position(|t| t.name == label) {
                Some(i) => i,
                None => {
                    traces.push(empty_trace(&r.traffic));
                    traces.len() - 1
                }
            };
            traces[idx].lat.push(r.lat);
            traces[idx].lon.push(r.lon);
        }

        let center = dataset.centroid().map(|(lat, lon)| Center { lat, lon });

        MapFigure {
            data: traces,
            layout: Layout {
                title: Text {
                    text: self.settings.title.clone(),
                },
                height: self.settings.height,
                mapbox: Mapbox {
                    style: self.settings.style.clone(),
                    zoom: self.settings.zoom,
                    center,
                },
                legend: Legend {
                    title: Text {
                        text: "traffic".to_string(),
                    },
                    tracegroupgap: 0,
                },
                margin: Margin { t: 60 },
            },
        }
    }
}

fn empty_trace(status: &TrafficStatus) -> ScatterMapboxTrace {
    let label = status.as_str().to_string();
    ScatterMapboxTrace {
        kind: "scattermapbox",
        mode: "markers",
        hovertemplate: format!("traffic={label}<br>lat=%{{lat}}<br>lon=%{{lon}}<extra></extra>"),
        legendgroup: label.clone(),
        name: label,
        showlegend: true,
        subplot: "mapbox",
        lat: Vec::new(),
        lon: Vec::new(),
        marker: Marker {
            color: status_color(status),
        },
    }
}
