use std::fs;
use std::path::Path;

use serde_json::{Value, json};

use crate::decoder::ingest::Shape;
use crate::decoder::types::{Attributes, GeometryKind, TechniqueParams, TextStyle};
use crate::error::ThemeError;

const DEFAULT_COLOR: &str = "#000000";

#[derive(Debug, Clone, PartialEq)]
pub enum Technique {
    Fill { color: String },
    SolidLine { color: String, line_width: f64 },
    Circle { color: String, size: f64 },
    Text { text_property: String, style: TextStyle },
}

impl Technique {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Technique::Fill { .. } => GeometryKind::Polygon,
            Technique::SolidLine { .. } => GeometryKind::SolidLine,
            Technique::Circle { .. } => GeometryKind::Point,
            Technique::Text { .. } => GeometryKind::Text,
        }
    }

    fn accepts(&self, shape: &Shape) -> bool {
        matches!(
            (self, shape),
            (Technique::Fill { .. }, Shape::Polygon(_))
                | (Technique::SolidLine { .. }, Shape::Line(_))
                | (Technique::Circle { .. }, Shape::Point(_))
                | (Technique::Text { .. }, Shape::Point(_))
        )
    }

    pub fn params(&self) -> Option<TechniqueParams> {
        match self {
            Technique::Fill { color } => Some(TechniqueParams::Fill {
                color: color.clone(),
            }),
            Technique::SolidLine { color, line_width } => Some(TechniqueParams::SolidLine {
                color: color.clone(),
                line_width: *line_width,
            }),
            Technique::Circle { color, size } => Some(TechniqueParams::Circle {
                color: color.clone(),
                size: *size,
            }),
            Technique::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Eq(FilterKey, Value),
    Neq(FilterKey, Value),
    In(FilterKey, Vec<Value>),
    Has(String),
    NotHas(String),
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterKey {
    GeometryType,
    Property(String),
}

struct FilterContext<'a> {
    shape: &'a Shape,
    properties: &'a Attributes,
}

impl FilterContext<'_> {
    fn value(&self, key: &FilterKey) -> Option<Value> {
        match key {
            FilterKey::GeometryType => Some(Value::String(
                match self.shape {
                    Shape::Point(_) => "Point",
                    Shape::Line(_) => "LineString",
                    Shape::Polygon(_) => "Polygon",
                }
                .to_string(),
            )),
            FilterKey::Property(name) => self.properties.get(name).cloned(),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => a == b,
    }
}

impl Filter {
    fn evaluate(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Filter::Eq(key, expected) => ctx
                .value(key)
                .is_some_and(|actual| values_equal(&actual, expected)),
            Filter::Neq(key, expected) => !ctx
                .value(key)
                .is_some_and(|actual| values_equal(&actual, expected)),
            Filter::In(key, values) => ctx
                .value(key)
                .is_some_and(|actual| values.iter().any(|v| values_equal(&actual, v))),
            Filter::Has(name) => ctx.properties.contains_key(name),
            Filter::NotHas(name) => !ctx.properties.contains_key(name),
            Filter::All(filters) => filters.iter().all(|filter| filter.evaluate(ctx)),
            Filter::Any(filters) => filters.iter().any(|filter| filter.evaluate(ctx)),
            Filter::Not(filter) => !filter.evaluate(ctx),
            Filter::Unknown => false,
        }
    }
}

fn parse_filter_key(value: &Value) -> Option<FilterKey> {
    let name = value.as_str()?;
    match name {
        "$geometryType" | "$type" => Some(FilterKey::GeometryType),
        _ => Some(FilterKey::Property(name.to_string())),
    }
}

fn parse_filter(value: &Value) -> Filter {
    let Some(array) = value.as_array() else {
        return match value.as_bool() {
            Some(true) => Filter::All(Vec::new()),
            _ => Filter::Unknown,
        };
    };
    let Some(op) = array.first().and_then(Value::as_str) else {
        return Filter::Unknown;
    };
    match (op, array.len()) {
        ("==" | "!=", 3) => {
            let Some(key) = parse_filter_key(&array[1]) else {
                return Filter::Unknown;
            };
            if op == "==" {
                Filter::Eq(key, array[2].clone())
            } else {
                Filter::Neq(key, array[2].clone())
            }
        }
        ("in", 3) => match (parse_filter_key(&array[1]), array[2].as_array()) {
            (Some(key), Some(values)) => Filter::In(key, values.clone()),
            _ => Filter::Unknown,
        },
        ("has" | "!has", 2) => match array[1].as_str() {
            Some(name) if op == "has" => Filter::Has(name.to_string()),
            Some(name) => Filter::NotHas(name.to_string()),
            None => Filter::Unknown,
        },
        ("all", _) => Filter::All(array[1..].iter().map(parse_filter).collect()),
        ("any", _) => Filter::Any(array[1..].iter().map(parse_filter).collect()),
        ("!", 2) => Filter::Not(Box::new(parse_filter(&array[1]))),
        _ => Filter::Unknown,
    }
}

fn parse_technique(rule: &Value) -> Option<Technique> {
    let name = rule.get("technique")?.as_str()?;
    let empty = json!({});
    let attr = rule.get("attr").unwrap_or(&empty);
    let color = attr
        .get("color")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_COLOR)
        .to_string();
    let number = |key: &str, default: f64| attr.get(key).and_then(Value::as_f64).unwrap_or(default);
    match name {
        "fill" => Some(Technique::Fill { color }),
        "solid-line" => Some(Technique::SolidLine {
            color,
            line_width: number("lineWidth", 1.0),
        }),
        "circles" | "circle" => Some(Technique::Circle {
            color,
            size: number("size", 8.0),
        }),
        "text" => Some(Technique::Text {
            text_property: attr
                .get("textProperty")
                .and_then(Value::as_str)
                .unwrap_or("name")
                .to_string(),
            style: TextStyle {
                size: number("size", 16.0),
                color,
            },
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StyleRule {
    filter: Option<Filter>,
    technique: Technique,
    min_zoom: Option<f64>,
    max_zoom: Option<f64>,
}

impl StyleRule {
    fn is_visible_on_zoom(&self, zoom: u8) -> bool {
        self.min_zoom.is_none_or(|min| (zoom as f64) >= min)
            && self.max_zoom.is_none_or(|max| max > (zoom as f64))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    rules: Vec<StyleRule>,
}

impl Default for Theme {
    fn default() -> Self {
        let value = json!({
            "styles": [
                {"when": ["==", "$geometryType", "Polygon"], "technique": "fill",
                 "attr": {"color": "#c8d7a0"}},
                {"when": ["==", "$geometryType", "LineString"], "technique": "solid-line",
                 "attr": {"color": "#4a4a4a", "lineWidth": 20000.0}},
                {"when": ["all", ["==", "$geometryType", "Point"], ["has", "name"]],
                 "technique": "text", "attr": {"color": "#202020", "size": 16.0}},
                {"when": ["==", "$geometryType", "Point"], "technique": "circles",
                 "attr": {"color": "#ff4040", "size": 8.0}}
            ]
        });
        Theme::from_value(&value)
    }
}

impl Theme {
    pub fn from_value(value: &Value) -> Self {
        let mut rules = Vec::new();
        let styles = value
            .get("styles")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for rule in styles {
            let Some(technique) = parse_technique(rule) else {
                tracing::debug!(rule = %rule, "ignoring style rule with unknown technique");
                continue;
            };
            rules.push(StyleRule {
                filter: rule.get("when").map(parse_filter),
                technique,
                min_zoom: rule.get("minZoomLevel").and_then(Value::as_f64),
                max_zoom: rule.get("maxZoomLevel").and_then(Value::as_f64),
            });
        }
        Self { rules }
    }

    pub fn techniques(&self) -> impl Iterator<Item = &Technique> {
        self.rules.iter().map(|rule| &rule.technique)
    }

    pub fn match_feature(
        &self,
        shape: &Shape,
        properties: &Attributes,
        zoom: u8,
    ) -> Option<(usize, &Technique)> {
        let ctx = FilterContext { shape, properties };
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            if !rule.technique.accepts(shape) || !rule.is_visible_on_zoom(zoom) {
                return None;
            }
            if let Technique::Text { text_property, .. } = &rule.technique {
                label_text(properties, text_property)?;
            }
            match rule.filter.as_ref() {
                Some(filter) if !filter.evaluate(&ctx) => None,
                _ => Some((index, &rule.technique)),
            }
        })
    }
}

pub fn label_text(properties: &Attributes, text_property: &str) -> Option<String> {
    match properties.get(text_property)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn read_theme(path: &Path) -> Result<Theme, ThemeError> {
    let contents = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents)?;
    Ok(Theme::from_value(&value))
}
