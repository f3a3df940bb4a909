//! Template rendering for rule names, notes, annotations and appended tags.
//!
//! Rule authors write Prometheus-style templates (`{{ $labels.instance }}`,
//! `{{ $value | humanize }}`, `{{ .TagsMap.service }}`). They are rewritten
//! into Handlebars syntax and rendered against a [`TemplateContext`] built
//! from the event.

use chrono::{Local, TimeZone};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason,
};
use n9e_common::types::{AlertEvent, AlertRule};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Template: {0}")]
pub struct TemplateError(pub String);

/// Renders one template string against an event context.
pub trait Renderer: Send + Sync {
    fn render(&self, text: &str, ctx: &TemplateContext) -> Result<String, TemplateError>;
}

/// Values visible to templates.
///
/// `labels`/`value` back the `$labels`/`$value` shorthands; the remaining
/// fields are reachable as `.TagsMap`, `.TriggerValue`, `.RuleName`...
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateContext {
    #[serde(rename = "labels")]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "value")]
    pub value: f64,
    pub tags_map: BTreeMap<String, String>,
    pub trigger_value: String,
    pub rule_id: i64,
    pub rule_name: String,
    pub severity: i32,
    pub group_name: String,
    pub cluster: String,
    pub target_ident: String,
    pub target_note: String,
    pub trigger_time: i64,
    pub is_recovered: bool,
}

impl TemplateContext {
    pub fn from_event(event: &AlertEvent, value: f64) -> Self {
        let tags = event.tags.as_map().clone();
        Self {
            labels: tags.clone(),
            value,
            tags_map: tags,
            trigger_value: event.trigger_value.clone(),
            rule_id: event.rule_id,
            rule_name: event.rule_name.clone(),
            severity: event.severity,
            group_name: event.group_name.clone(),
            cluster: event.cluster.clone(),
            target_ident: event.target_ident.clone(),
            target_note: event.target_note.clone(),
            trigger_time: event.trigger_time,
            is_recovered: event.is_recovered,
        }
    }
}

/// Rewrites Go template actions into Handlebars expressions.
struct Translator {
    action: Regex,
    dollar: Regex,
    dot_field: Regex,
    dot_alone: Regex,
}

impl Translator {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            action: Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}")?,
            dollar: Regex::new(r"\$([A-Za-z_]\w*)")?,
            dot_field: Regex::new(r"(^|[\s(])\.([A-Za-z_]\w*)")?,
            dot_alone: Regex::new(r"(^|\s)\.(\s|$)")?,
        })
    }

    fn translate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut blocks: Vec<&'static str> = Vec::new();
        let mut last = 0;
        for caps in self.action.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            let inner = caps.get(1).map_or("", |m| m.as_str());
            // raw blocks, partials and handlebars' own block syntax pass through
            if inner.starts_with(['{', '#', '/', '>', '!']) {
                out.push_str(whole.as_str());
                continue;
            }
            out.push_str("{{");
            out.push_str(&self.action(inner, &mut blocks));
            out.push_str("}}");
        }
        out.push_str(&text[last..]);
        out
    }

    fn action(&self, inner: &str, blocks: &mut Vec<&'static str>) -> String {
        let (keyword, rest) = inner.split_once(char::is_whitespace).unwrap_or((inner, ""));
        let rest = rest.trim();
        match keyword {
            "if" => {
                blocks.push("if");
                format!("#if {}", self.pipeline(rest))
            }
            "range" => {
                blocks.push("each");
                format!("#each {}", self.pipeline(rest))
            }
            "with" => {
                blocks.push("with");
                format!("#with {}", self.pipeline(rest))
            }
            "else" => match rest.strip_prefix("if ") {
                Some(cond) => format!("else if {}", self.pipeline(cond.trim())),
                None => "else".to_string(),
            },
            "end" => format!("/{}", blocks.pop().unwrap_or("if")),
            _ => self.pipeline(inner),
        }
    }

    /// `x | f a | g` becomes `g (f a x)`.
    fn pipeline(&self, expr: &str) -> String {
        let mut acc = String::new();
        for (i, segment) in split_pipeline(expr).iter().enumerate() {
            let segment = self.normalize(segment);
            acc = if i == 0 {
                segment
            } else if acc.contains(char::is_whitespace) {
                format!("{segment} ({acc})")
            } else {
                format!("{segment} {acc}")
            };
        }
        acc
    }

    fn normalize(&self, segment: &str) -> String {
        let segment = segment.trim();
        let segment = match segment.strip_prefix("index ") {
            Some(rest) => format!("lookup {rest}"),
            None => segment.to_string(),
        };
        let segment = self.dollar.replace_all(&segment, "$1");
        let segment = self.dot_field.replace_all(&segment, "${1}${2}");
        let segment = self.dot_alone.replace_all(&segment, "${1}this${2}");
        if segment == "." {
            "this".to_string()
        } else {
            segment.into_owned()
        }
    }
}

fn split_pipeline(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '|' if !in_quotes => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// Handlebars-backed [`Renderer`] with the Prometheus helper set.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
    translator: Translator,
}

impl HandlebarsRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("humanize", Box::new(humanize_helper));
        registry.register_helper("humanize1024", Box::new(humanize1024_helper));
        registry.register_helper("humanizeDuration", Box::new(humanize_duration_helper));
        registry.register_helper("humanizePercentage", Box::new(humanize_percentage_helper));
        registry.register_helper("timeformat", Box::new(timeformat_helper));
        registry.register_helper("printf", Box::new(printf_helper));
        registry.register_helper("toUpper", Box::new(to_upper_helper));
        registry.register_helper("toLower", Box::new(to_lower_helper));

        let translator = Translator::new().map_err(|e| TemplateError(e.to_string()))?;
        Ok(Self {
            registry,
            translator,
        })
    }

    /// The Handlebars source a template is rendered as.
    pub fn translate(&self, text: &str) -> String {
        self.translator.translate(text)
    }
}

impl Renderer for HandlebarsRenderer {
    fn render(&self, text: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        let source = self.translator.translate(text);
        self.registry
            .render_template(&source, ctx)
            .map_err(|e| TemplateError(e.to_string()))
    }
}

/// A field whose template failed; the raw text was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

/// Renders appended tags, then rule name, note and annotations into `event`.
///
/// Appended tags are rendered first so the other fields can reference them.
/// A failing field keeps its unrendered text and is reported back.
pub fn render_event_fields(
    renderer: &dyn Renderer,
    rule: &AlertRule,
    event: &mut AlertEvent,
    value: f64,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let ctx = TemplateContext::from_event(event, value);
    for (key, raw) in rule.append_tag_pairs() {
        let field = format!("append_tags.{key}");
        let rendered = render_or_raw(renderer, &raw, &ctx, &field, &mut errors);
        event.tags.insert(key, rendered);
    }

    let ctx = TemplateContext::from_event(event, value);
    event.rule_name = render_or_raw(renderer, &rule.name, &ctx, "rule_name", &mut errors);
    event.rule_note = render_or_raw(renderer, &rule.note, &ctx, "rule_note", &mut errors);
    event.annotations = rule
        .annotations
        .iter()
        .map(|(k, raw)| {
            let field = format!("annotations.{k}");
            (k.clone(), render_or_raw(renderer, raw, &ctx, &field, &mut errors))
        })
        .collect();

    errors
}

fn render_or_raw(
    renderer: &dyn Renderer,
    raw: &str,
    ctx: &TemplateContext,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> String {
    match renderer.render(raw, ctx) {
        Ok(s) => s,
        Err(e) => {
            errors.push(FieldError {
                field: field.to_string(),
                reason: e.0,
            });
            raw.to_string()
        }
    }
}

// ---- formatting ----

/// `%.Ng`-like: `digits` significant digits, trailing zeros dropped.
pub fn format_significant(v: f64, digits: i32) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{v}");
    }
    let exp = v.abs().log10().floor() as i32;
    let decimals = (digits - 1 - exp).max(0) as usize;
    let s = format!("{v:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

pub fn humanize(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format_significant(v, 4);
    }
    if v.abs() >= 1.0 {
        const PREFIXES: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];
        let mut x = v;
        let mut i = 0;
        while x.abs() >= 1000.0 && i < PREFIXES.len() - 1 {
            x /= 1000.0;
            i += 1;
        }
        format!("{}{}", format_significant(x, 4), PREFIXES[i])
    } else {
        const PREFIXES: [&str; 9] = ["", "m", "u", "n", "p", "f", "a", "z", "y"];
        let mut x = v;
        let mut i = 0;
        while x.abs() < 1.0 && i < PREFIXES.len() - 1 {
            x *= 1000.0;
            i += 1;
        }
        format!("{}{}", format_significant(x, 4), PREFIXES[i])
    }
}

pub fn humanize1024(v: f64) -> String {
    if v.abs() < 1.0 || !v.is_finite() {
        return format_significant(v, 4);
    }
    const PREFIXES: [&str; 9] = ["", "ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];
    let mut x = v;
    let mut i = 0;
    while x.abs() >= 1024.0 && i < PREFIXES.len() - 1 {
        x /= 1024.0;
        i += 1;
    }
    format!("{}{}", format_significant(x, 4), PREFIXES[i])
}

/// Seconds as `1d 2h 3m 4s`; sub-second values as `ms`/`us`/`ns`.
pub fn humanize_duration(v: f64) -> String {
    if !v.is_finite() {
        return format_significant(v, 4);
    }
    if v == 0.0 {
        return "0s".to_string();
    }
    if v.abs() >= 1.0 {
        let sign = if v < 0.0 { "-" } else { "" };
        let v = v.abs();
        let whole = v as i64;
        let days = whole / 86_400;
        let hours = whole / 3_600 % 24;
        let minutes = whole / 60 % 60;
        let seconds = whole % 60;
        return if days != 0 {
            format!("{sign}{days}d {hours}h {minutes}m {seconds}s")
        } else if hours != 0 {
            format!("{sign}{hours}h {minutes}m {seconds}s")
        } else if minutes != 0 {
            format!("{sign}{minutes}m {seconds}s")
        } else {
            format!("{sign}{}s", format_significant(v, 4))
        };
    }
    const PREFIXES: [&str; 3] = ["m", "u", "n"];
    let mut x = v;
    for prefix in PREFIXES {
        x *= 1000.0;
        if x.abs() >= 1.0 {
            return format!("{}{prefix}s", format_significant(x, 4));
        }
    }
    format!("{}ns", format_significant(x, 4))
}

pub fn humanize_percentage(v: f64) -> String {
    format!("{}%", format_significant(v * 100.0, 4))
}

pub fn timeformat(ts: i64, fmt: &str) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(t) => t.format(fmt).to_string(),
        None => ts.to_string(),
    }
}

/// Largest precision `sprintf` honours; anything above is clamped.
const MAX_PRECISION: usize = 64;

/// Subset of Go's `fmt.Sprintf`: `%s %v %d %f %g %x %%` with optional
/// precision.
pub fn sprintf(format: &str, args: &[Json]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            let parsed = if digits.is_empty() {
                0
            } else {
                digits.parse().unwrap_or(MAX_PRECISION)
            };
            precision = Some(parsed.min(MAX_PRECISION));
        }
        let Some(verb) = chars.next() else {
            out.push('%');
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.next() else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        match verb {
            'd' => match as_f64(arg) {
                Some(n) => out.push_str(&(n.trunc() as i64).to_string()),
                None => out.push_str(&format!("%!d({})", json_to_string(arg))),
            },
            'f' => match as_f64(arg) {
                Some(n) => {
                    let p = precision.unwrap_or(6);
                    out.push_str(&format!("{n:.p$}"));
                }
                None => out.push_str(&format!("%!f({})", json_to_string(arg))),
            },
            'g' => match as_f64(arg) {
                Some(n) => match precision {
                    Some(p) => out.push_str(&format_significant(n, p.max(1) as i32)),
                    None => out.push_str(&n.to_string()),
                },
                None => out.push_str(&format!("%!g({})", json_to_string(arg))),
            },
            'x' => match as_f64(arg) {
                Some(n) => out.push_str(&format!("{:x}", n.trunc() as i64)),
                None => out.push_str(
                    &json_to_string(arg)
                        .bytes()
                        .map(|b| format!("{b:02x}"))
                        .collect::<String>(),
                ),
            },
            's' | 'v' => out.push_str(&json_to_string(arg)),
            other => {
                out.push('%');
                out.push(other);
            }
        }
    }
    out
}

fn as_f64(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse().ok(),
        Json::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn json_to_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

// ---- helpers ----

fn param<'a>(h: &'a Helper, idx: usize, name: &'static str) -> Result<&'a Json, RenderError> {
    h.param(idx)
        .map(|p| p.value())
        .ok_or_else(|| RenderErrorReason::ParamNotFoundForIndex(name, idx).into())
}

fn number_param(h: &Helper, idx: usize, name: &'static str) -> Result<f64, RenderError> {
    let value = param(h, idx, name)?;
    as_f64(value).ok_or_else(|| {
        RenderErrorReason::Other(format!("{name}: '{}' is not a number", json_to_string(value)))
            .into()
    })
}

fn humanize_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&humanize(number_param(h, 0, "humanize")?))?;
    Ok(())
}

fn humanize1024_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&humanize1024(number_param(h, 0, "humanize1024")?))?;
    Ok(())
}

fn humanize_duration_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&humanize_duration(number_param(h, 0, "humanizeDuration")?))?;
    Ok(())
}

fn humanize_percentage_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&humanize_percentage(number_param(h, 0, "humanizePercentage")?))?;
    Ok(())
}

fn timeformat_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let ts = number_param(h, 0, "timeformat")? as i64;
    let fmt = h
        .param(1)
        .and_then(|p| p.value().as_str())
        .unwrap_or(DEFAULT_TIME_FORMAT);
    out.write(&timeformat(ts, fmt))?;
    Ok(())
}

fn printf_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = json_to_string(param(h, 0, "printf")?);
    let args: Vec<Json> = h.params().iter().skip(1).map(|p| p.value().clone()).collect();
    out.write(&sprintf(&format, &args))?;
    Ok(())
}

fn to_upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&json_to_string(param(h, 0, "toUpper")?).to_uppercase())?;
    Ok(())
}

fn to_lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&json_to_string(param(h, 0, "toLower")?).to_lowercase())?;
    Ok(())
}
