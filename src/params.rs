use crate::models::{GenerationRecord, ParsedParameters};
use regex::Regex;
use tracing::warn;

lazy_static! {
    static ref STEPS_REGEX: Regex = Regex::new(r"Steps:\s*(\d+)").unwrap();
    static ref SAMPLER_REGEX: Regex = Regex::new(r"Sampler:\s*([^,]+)").unwrap();
    static ref CFG_REGEX: Regex = Regex::new(r"CFG scale:\s*([\d.]+)").unwrap();
    static ref SEED_REGEX: Regex = Regex::new(r"Seed:\s*(\d+)").unwrap();
    static ref MODEL_REGEX: Regex = Regex::new(r"Model:\s*([^,]+)").unwrap();
    static ref MODEL_HASH_REGEX: Regex = Regex::new(r"Model hash:\s*([a-fA-F0-9]+)").unwrap();
}

const NEGATIVE_PROMPT_LABEL: &str = "Negative prompt:";
const SETTINGS_MARKERS: [&str; 3] = ["Steps:", "Sampler:", "CFG"];

pub const PLACEHOLDER_PROMPT: &str = "AI generated image";
pub const PLACEHOLDER_MODEL: &str = "sd_xl_base_1.0";
pub const PLACEHOLDER_MODEL_HASH: &str = "be9edd61";

/// Parse an Automatic1111 `parameters` blob into its individual fields.
///
/// Every field search is independent, so the settings may appear in any
/// order. Anything that does not match is simply left unset; this never
/// fails, it just returns whatever could be recovered.
///
/// Quirk carried over from the de facto format: without a
/// `Negative prompt:` label the entire text is taken as the prompt, even if
/// a settings tail follows. Civitai's own reader leans on the same label
/// positions, so this is deliberately not smarter than the convention.
pub fn parse(text: &str) -> ParsedParameters {
    let mut parsed = ParsedParameters::default();

    let settings = match text.split_once(NEGATIVE_PROMPT_LABEL) {
        Some((prompt, rest)) => {
            parsed.prompt = Some(prompt.trim().to_string());

            let settings_start = SETTINGS_MARKERS
                .iter()
                .filter_map(|marker| rest.find(marker))
                .min()
                .unwrap_or(rest.len());
            parsed.negative = Some(rest[..settings_start].trim().to_string());
            &rest[settings_start..]
        }
        None => {
            if SETTINGS_MARKERS.iter().any(|marker| text.contains(marker)) {
                warn!("parameters text has a settings tail but no negative-prompt label; treating everything as prompt");
            }
            parsed.prompt = Some(text.trim().to_string());
            ""
        }
    };

    if !settings.is_empty() {
        parsed.steps = capture(&STEPS_REGEX, settings);
        parsed.sampler = capture(&SAMPLER_REGEX, settings);
        parsed.cfg = capture(&CFG_REGEX, settings);
        parsed.seed = capture(&SEED_REGEX, settings);
        parsed.model = capture(&MODEL_REGEX, settings);
        parsed.model_hash = capture(&MODEL_HASH_REGEX, settings);
    }

    parsed
}

fn capture(regex: &Regex, settings: &str) -> Option<String> {
    regex
        .captures(settings)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Serialize a record into the exact text shape Civitai's parser expects.
/// Key order and label spelling are load-bearing.
pub fn compose(record: &GenerationRecord) -> String {
    let mut params = record.prompt.trim().to_string();

    if let Some(negative) = record
        .negative_prompt
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        params.push_str("\nNegative prompt: ");
        params.push_str(negative);
    }

    let mut settings = vec![
        format!("Steps: {}", record.steps),
        format!("Sampler: {}", record.sampler),
        format!("CFG scale: {}", record.cfg_scale),
        format!("Seed: {}", record.seed),
        format!(
            "Size: {}x{}",
            record.width.unwrap_or(512),
            record.height.unwrap_or(512)
        ),
    ];
    if let Some(model) = record.model_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        settings.push(format!("Model: {model}"));
    }
    if let Some(hash) = record.model_hash.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        settings.push(format!("Model hash: {hash}"));
    }
    if record.clip_skip != 1 {
        settings.push(format!("Clip skip: {}", record.clip_skip));
    }

    params.push('\n');
    params.push_str(&settings.join(", "));
    params
}

/// Fill blank fields with the minimal values Civitai accepts. Anything the
/// user already supplied is left alone.
pub fn autofill(record: &mut GenerationRecord) {
    use rand::Rng;

    if record.prompt.trim().is_empty() {
        record.prompt = PLACEHOLDER_PROMPT.to_string();
    }
    if record.seed < 0 {
        record.seed = rand::thread_rng().gen_range(0..(1i64 << 32));
    }
    if record.model_name.as_deref().map_or(true, |m| m.trim().is_empty()) {
        record.model_name = Some(PLACEHOLDER_MODEL.to_string());
    }
    if record.model_hash.as_deref().map_or(true, |h| h.trim().is_empty()) {
        record.model_hash = Some(PLACEHOLDER_MODEL_HASH.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(prompt: &str) -> GenerationRecord {
        GenerationRecord {
            prompt: prompt.to_string(),
            width: Some(512),
            height: Some(512),
            sampler: "Euler".to_string(),
            ..GenerationRecord::default()
        }
    }

    #[test]
    fn parses_full_a1111_blob() {
        let text = "A cat\nNegative prompt: blurry\nSteps: 20, Sampler: Euler, CFG scale: 7, Seed: 42, Model: foo, Model hash: abc123";
        let parsed = parse(text);
        assert_eq!(parsed.prompt.as_deref(), Some("A cat"));
        assert_eq!(parsed.negative.as_deref(), Some("blurry"));
        assert_eq!(parsed.steps.as_deref(), Some("20"));
        assert_eq!(parsed.sampler.as_deref(), Some("Euler"));
        assert_eq!(parsed.cfg.as_deref(), Some("7"));
        assert_eq!(parsed.seed.as_deref(), Some("42"));
        assert_eq!(parsed.model.as_deref(), Some("foo"));
        assert_eq!(parsed.model_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn fields_are_recovered_in_any_order() {
        let text = "portrait\nNegative prompt: ugly\nSampler: DDIM, Model hash: DEADbeef01, Steps: 35, CFG scale: 9.5";
        let parsed = parse(text);
        assert_eq!(parsed.sampler.as_deref(), Some("DDIM"));
        assert_eq!(parsed.steps.as_deref(), Some("35"));
        assert_eq!(parsed.cfg.as_deref(), Some("9.5"));
        assert_eq!(parsed.model_hash.as_deref(), Some("DEADbeef01"));
        assert_eq!(parsed.seed, None);
        assert_eq!(parsed.model, None);
    }

    #[test]
    fn no_negative_prompt_label_means_everything_is_prompt() {
        let parsed = parse("  a lonely prompt  ");
        assert_eq!(parsed.prompt.as_deref(), Some("a lonely prompt"));
        assert_eq!(parsed.negative, None);
        assert_eq!(parsed.steps, None);

        // The settings tail is swallowed into the prompt without the label.
        // That matches the reference behavior of the format, so keep it.
        let parsed = parse("a prompt\nSteps: 20, Sampler: Euler");
        assert_eq!(
            parsed.prompt.as_deref(),
            Some("a prompt\nSteps: 20, Sampler: Euler")
        );
        assert_eq!(parsed.steps, None);
    }

    #[test]
    fn negative_prompt_stops_at_first_settings_marker() {
        let text = "x\nNegative prompt: bad hands, extra digits\nCFG scale: 7, Steps: 12";
        let parsed = parse(text);
        assert_eq!(parsed.negative.as_deref(), Some("bad hands, extra digits"));
        assert_eq!(parsed.cfg.as_deref(), Some("7"));
        assert_eq!(parsed.steps.as_deref(), Some("12"));
    }

    #[test]
    fn empty_settings_tail_leaves_fields_unset() {
        let parsed = parse("x\nNegative prompt: blurry");
        assert_eq!(parsed.prompt.as_deref(), Some("x"));
        assert_eq!(parsed.negative.as_deref(), Some("blurry"));
        assert_eq!(parsed.steps, None);
        assert_eq!(parsed.sampler, None);
    }

    #[test]
    fn composes_minimal_record_exactly() {
        let composed = compose(&record("x"));
        assert_eq!(
            composed,
            "x\nSteps: 20, Sampler: Euler, CFG scale: 7, Seed: -1, Size: 512x512"
        );
    }

    #[test]
    fn optional_segments_are_omitted_when_blank() {
        let composed = compose(&record("x"));
        assert!(!composed.contains("Model:"));
        assert!(!composed.contains("Model hash:"));
        assert!(!composed.contains("Clip skip:"));

        let mut full = record("x");
        full.model_name = Some("realisticVisionV51".to_string());
        full.model_hash = Some("15012c538f".to_string());
        full.clip_skip = 2;
        let composed = compose(&full);
        assert!(composed.ends_with(
            "Model: realisticVisionV51, Model hash: 15012c538f, Clip skip: 2"
        ));
    }

    #[test]
    fn fractional_cfg_keeps_its_decimals() {
        let mut r = record("x");
        r.cfg_scale = 7.5;
        assert!(compose(&r).contains("CFG scale: 7.5,"));
    }

    #[test]
    fn negative_prompt_line_is_omitted_when_empty() {
        let mut r = record("x");
        r.negative_prompt = Some("   ".to_string());
        assert!(!compose(&r).contains("Negative prompt:"));

        r.negative_prompt = Some("blurry".to_string());
        assert!(compose(&r).contains("\nNegative prompt: blurry\n"));
    }

    #[test]
    fn compose_then_parse_round_trips() {
        let mut r = record("a cat, sitting on a mat");
        r.negative_prompt = Some("blurry, low quality".to_string());
        r.steps = 28;
        r.cfg_scale = 6.5;
        r.seed = 1234567890;
        r.model_name = Some("sd_xl_base_1.0".to_string());
        r.model_hash = Some("be9edd61".to_string());

        let parsed = parse(&compose(&r));
        assert_eq!(parsed.prompt.as_deref(), Some("a cat, sitting on a mat"));
        assert_eq!(parsed.negative.as_deref(), Some("blurry, low quality"));
        assert_eq!(parsed.steps.as_deref(), Some("28"));
        assert_eq!(parsed.sampler.as_deref(), Some("Euler"));
        assert_eq!(parsed.cfg.as_deref(), Some("6.5"));
        assert_eq!(parsed.seed.as_deref(), Some("1234567890"));
        assert_eq!(parsed.model.as_deref(), Some("sd_xl_base_1.0"));
        assert_eq!(parsed.model_hash.as_deref(), Some("be9edd61"));
    }

    #[test]
    fn serialization_is_stable_under_reparse() {
        let mut r = record("stable");
        r.negative_prompt = Some("noise".to_string());
        r.seed = 7;
        let once = compose(&r);

        let parsed = parse(&once);
        let rebuilt = GenerationRecord {
            prompt: parsed.prompt.unwrap(),
            negative_prompt: parsed.negative,
            steps: parsed.steps.unwrap().parse().unwrap(),
            sampler: parsed.sampler.unwrap(),
            cfg_scale: parsed.cfg.unwrap().parse().unwrap(),
            seed: parsed.seed.unwrap().parse().unwrap(),
            width: Some(512),
            height: Some(512),
            ..GenerationRecord::default()
        };
        assert_eq!(compose(&rebuilt), once);
    }

    #[test]
    fn autofill_only_touches_blank_fields() {
        let mut r = record("  ");
        autofill(&mut r);
        assert_eq!(r.prompt, PLACEHOLDER_PROMPT);
        assert!(r.seed >= 0 && r.seed < (1i64 << 32));
        assert_eq!(r.model_name.as_deref(), Some(PLACEHOLDER_MODEL));
        assert_eq!(r.model_hash.as_deref(), Some(PLACEHOLDER_MODEL_HASH));

        let mut r = record("my prompt");
        r.seed = 42;
        r.model_name = Some("mine".to_string());
        r.model_hash = Some("123abc".to_string());
        autofill(&mut r);
        assert_eq!(r.prompt, "my prompt");
        assert_eq!(r.seed, 42);
        assert_eq!(r.model_name.as_deref(), Some("mine"));
        assert_eq!(r.model_hash.as_deref(), Some("123abc"));
    }
}
