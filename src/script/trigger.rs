//! Conversion of script trigger maps into engine [`Trigger`]s.
//!
//! ```text
//! engine.trigger(#{
//!     sample: kick, bus: 1, key: 62, rootKey: 60, gain: 0.8,
//!     "loop": #{ begin: 0, end: 22050, xfade: 256 },
//!     envelope: #{ attack: 0.01, release: 0.3 },
//!     fx: [#{ tag: "lowpass", id: "lp", cutoff: 800.0 }],
//!     modulate: #{ expr: "lp.cutoff = 800 + depth * sin(t * 6.28);", depth: 400 },
//! })
//! ```

use player_engine::{EffectDescriptor, LoopRegion, ModulationSource, Trigger};
use rhai::{Dynamic, Map, INT};

pub type ParseResult<T> = Result<T, String>;

/// Reads an INT or FLOAT as f64.
pub fn number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|v| v as f64))
}

fn float_field(map: &Map, key: &str) -> ParseResult<Option<f32>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) if value.is_unit() => Ok(None),
        Some(value) => number(value)
            .map(|v| Some(v as f32))
            .ok_or_else(|| format!("'{}' must be a number, got {}", key, value.type_name())),
    }
}

fn int_field(map: &Map, key: &str) -> ParseResult<Option<INT>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) if value.is_unit() => Ok(None),
        Some(value) => value
            .as_int()
            .ok()
            .or_else(|| number(value).map(|v| v.round() as INT))
            .map(Some)
            .ok_or_else(|| format!("'{}' must be an integer, got {}", key, value.type_name())),
    }
}

fn index_field(map: &Map, key: &str) -> ParseResult<Option<usize>> {
    match int_field(map, key)? {
        None => Ok(None),
        Some(v) if v < 0 => Err(format!("'{}' must not be negative", key)),
        Some(v) => Ok(Some(v as usize)),
    }
}

fn note_field(map: &Map, key: &str) -> ParseResult<Option<i32>> {
    match int_field(map, key)? {
        None => Ok(None),
        Some(v) if (0..=127).contains(&v) => Ok(Some(v as i32)),
        Some(v) => Err(format!("'{}' must be a MIDI note (0..127), got {}", key, v)),
    }
}

fn map_field(map: &Map, key: &str) -> ParseResult<Option<Map>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) if value.is_unit() => Ok(None),
        Some(value) => value
            .clone()
            .try_cast::<Map>()
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a map, got {}", key, value.type_name())),
    }
}

fn loop_region(map: &Map) -> ParseResult<LoopRegion> {
    Ok(LoopRegion {
        begin: index_field(map, "begin")?.unwrap_or(0),
        end: index_field(map, "end")?.ok_or("'loop' needs an 'end'")?,
        crossfade: index_field(map, "xfade")?.unwrap_or(0),
    })
}

fn effect(value: &Dynamic) -> ParseResult<EffectDescriptor> {
    let map = value
        .clone()
        .try_cast::<Map>()
        .ok_or_else(|| format!("'fx' entries must be maps, got {}", value.type_name()))?;
    let tag = map
        .get("tag")
        .and_then(|tag| tag.clone().into_immutable_string().ok())
        .ok_or("'fx' entries need a 'tag' string")?;
    let mut descriptor = EffectDescriptor::new(tag.as_str());
    for (key, value) in map.iter() {
        match key.as_str() {
            "tag" => {}
            "id" => {
                let id = value
                    .clone()
                    .into_immutable_string()
                    .map_err(|_| "'fx' id must be a string".to_string())?;
                descriptor.id = Some(id.to_string());
            }
            param => {
                let v = number(value).ok_or_else(|| {
                    format!("parameter '{}' of '{}' must be a number", param, tag)
                })?;
                descriptor.parameters.push((param.to_string(), v as f32));
            }
        }
    }
    Ok(descriptor)
}

fn modulation(map: &Map) -> ParseResult<ModulationSource> {
    let mut source = ModulationSource::default();
    for (key, value) in map.iter() {
        if key.as_str() == "expr" {
            source.expression = value
                .clone()
                .into_immutable_string()
                .map_err(|_| "'modulate' expr must be a string".to_string())?
                .to_string();
        } else {
            let v = number(value)
                .ok_or_else(|| format!("modulation variable '{}' must be a number", key))?;
            source.variables.push((key.to_string(), v as f32));
        }
    }
    if source.expression.is_empty() {
        return Err("'modulate' needs an 'expr'".to_string());
    }
    Ok(source)
}

/// Builds a [`Trigger`] from a script map. Unknown keys are ignored.
pub fn parse_trigger(map: &Map) -> ParseResult<Trigger> {
    let sample = int_field(map, "sample")?.ok_or("trigger needs a 'sample'")?;
    let sample = u32::try_from(sample).map_err(|_| format!("invalid sample id {}", sample))?;
    let mut trigger = Trigger::new(sample);

    if let Some(bus) = index_field(map, "bus")? {
        trigger.bus = bus;
    }
    if let Some(key) = note_field(map, "key")? {
        trigger.key = key;
    }
    if let Some(root) = note_field(map, "rootKey")? {
        trigger.root_key = root;
    }
    if let Some(offset) = index_field(map, "offset")? {
        trigger.offset = offset;
    }
    if let Some(gain) = float_field(map, "gain")? {
        trigger.gain = gain;
    }
    if let Some(tune) = float_field(map, "tune")? {
        trigger.tune = tune;
    }
    if let Some(region) = map_field(map, "loop")? {
        trigger.loop_region = Some(loop_region(&region)?);
    }
    if let Some(envelope) = map_field(map, "envelope")? {
        trigger.envelope.attack = float_field(&envelope, "attack")?;
        trigger.envelope.decay = float_field(&envelope, "decay")?;
        trigger.envelope.sustain = float_field(&envelope, "sustain")?;
        trigger.envelope.release = float_field(&envelope, "release")?;
    }
    match map.get("fx") {
        None => {}
        Some(value) if value.is_unit() => {}
        Some(value) => {
            let list = value
                .clone()
                .try_cast::<rhai::Array>()
                .ok_or("'fx' must be an array")?;
            trigger.effects = list.iter().map(effect).collect::<ParseResult<_>>()?;
        }
    }
    if let Some(source) = map_field(map, "modulate")? {
        trigger.modulation = Some(modulation(&source)?);
    }
    Ok(trigger)
}
