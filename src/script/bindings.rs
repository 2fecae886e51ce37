//! Native objects exposed to control scripts.
//!
//! Scripts never hold engine state. They hold small handles (`Bus` is a bus
//! index, `Effect` a bus index plus a slot) and every call is resolved
//! against the [`EngineHandle`] at the time it is made. Handles are passed
//! by value, which also lets them be used as the read-only globals `engine`
//! and `console`.

use super::trigger::{number, parse_trigger};
use crate::bridge::WorkerTask;
use crate::console::Console;
use crate::queue::TaskQueue;
use player_engine::EngineHandle;
use rhai::{Array, Dynamic, EvalAltResult, FnPtr, Map, FLOAT, INT};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn script_error(err: impl Display) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn to_index(value: INT, what: &str) -> ScriptResult<usize> {
    usize::try_from(value).map_err(|_| script_error(format!("invalid {} {}", what, value)))
}

#[derive(Clone)]
pub struct EngineApi {
    engine: EngineHandle,
    console: Console,
    content_dir: Arc<PathBuf>,
}

#[derive(Clone)]
pub struct BusHandle {
    engine: EngineHandle,
    index: usize,
}

#[derive(Clone)]
pub struct EffectHandle {
    engine: EngineHandle,
    bus: usize,
    slot: usize,
}

#[derive(Clone)]
pub struct ConsoleApi {
    console: Console,
}

impl ConsoleApi {
    fn log(&self, args: &[Dynamic]) {
        let line = args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.console.post_message(line);
    }
}

impl EngineApi {
    pub fn new(engine: EngineHandle, console: Console, content_dir: PathBuf) -> Self {
        Self {
            engine,
            console,
            content_dir: Arc::new(content_dir),
        }
    }

    /// Relative sample paths are looked up in the content folder.
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.content_dir.join(path)
        }
    }

    fn bus(&self, index: INT) -> ScriptResult<BusHandle> {
        let index = to_index(index, "bus")?;
        if index >= self.engine.num_buses() {
            return Err(script_error(format!(
                "bus {} out of range ({} buses)",
                index,
                self.engine.num_buses()
            )));
        }
        Ok(BusHandle {
            engine: self.engine.clone(),
            index,
        })
    }

    fn trigger(&self, map: Map) -> ScriptResult<INT> {
        let trigger = parse_trigger(&map).map_err(script_error)?;
        let triggered = self.engine.trigger(&trigger).map_err(script_error)?;
        if let Some(err) = triggered.modulation_error {
            self.console.post_message("*** Modulation Error ***");
            self.console.post_message(err.to_string());
        }
        Ok(triggered.id as INT)
    }

    fn release(&self, id: INT, release_time: Option<f32>) -> ScriptResult<()> {
        let id = u32::try_from(id).map_err(|_| script_error(format!("invalid voice id {}", id)))?;
        self.engine.release(id, release_time).map_err(script_error)
    }
}

impl BusHandle {
    fn effect(&self, slot: usize) -> EffectHandle {
        EffectHandle {
            engine: self.engine.clone(),
            bus: self.index,
            slot,
        }
    }
}

fn register_engine(engine: &mut rhai::Engine) {
    engine
        .register_type_with_name::<EngineApi>("Engine")
        .register_fn("add_sample", |api: EngineApi, path: &str| -> ScriptResult<INT> {
            let id = api.engine.add_sample(&api.resolve(path)).map_err(script_error)?;
            Ok(id as INT)
        })
        .register_fn(
            "add_sample_with_range",
            |api: EngineApi, path: &str, start: INT, stop: INT| -> ScriptResult<INT> {
                let start = to_index(start, "start frame")?;
                let stop = to_index(stop, "stop frame")?;
                let id = api
                    .engine
                    .add_sample_with_range(&api.resolve(path), start, stop)
                    .map_err(script_error)?;
                Ok(id as INT)
            },
        )
        .register_fn("bpm", |api: EngineApi| api.engine.transport().bpm as FLOAT)
        .register_fn("time", |api: EngineApi| {
            api.engine.transport().time_in_seconds as FLOAT
        })
        .register_fn("music_time", |api: EngineApi| {
            api.engine.transport().ppq_position as FLOAT
        })
        .register_fn("is_playing", |api: EngineApi| api.engine.transport().is_playing)
        .register_fn("sample_rate", |api: EngineApi| api.engine.sample_rate() as FLOAT)
        .register_fn("bus", |api: EngineApi, index: INT| api.bus(index))
        .register_fn("buses", |api: EngineApi| -> ScriptResult<Array> {
            (0..api.engine.num_buses() as INT)
                .map(|i| api.bus(i).map(Dynamic::from))
                .collect()
        })
        .register_fn("trigger", |api: EngineApi, map: Map| api.trigger(map))
        .register_fn("release", |api: EngineApi, id: INT| api.release(id, None))
        .register_fn(
            "release_with_time",
            |api: EngineApi, id: INT, seconds: Dynamic| -> ScriptResult<()> {
                let seconds = number(&seconds)
                    .ok_or_else(|| script_error("release time must be a number"))?;
                api.release(id, Some(seconds as f32))
            },
        )
        .register_fn("active_voices", |api: EngineApi| api.engine.active_voices() as INT)
        .register_fn("get_cc", |api: EngineApi, index: INT| -> ScriptResult<FLOAT> {
            let index = to_index(index, "controller")?;
            Ok(api.engine.controllers().get(index) as FLOAT)
        })
        .register_fn(
            "set_cc",
            |api: EngineApi, index: INT, value: Dynamic| -> ScriptResult<()> {
                let index = to_index(index, "controller")?;
                let value = number(&value)
                    .ok_or_else(|| script_error("controller value must be a number"))?;
                if api.engine.controllers().set(index, value as f32) {
                    Ok(())
                } else {
                    Err(script_error(format!("invalid controller {}", index)))
                }
            },
        )
        .register_fn("to_string", |_: EngineApi| "Engine".to_string())
        .register_fn("to_debug", |_: EngineApi| "Engine".to_string());
}

fn register_bus(engine: &mut rhai::Engine) {
    engine
        .register_type_with_name::<BusHandle>("Bus")
        .register_fn("index", |bus: BusHandle| bus.index as INT)
        .register_fn("gain", |bus: BusHandle| -> ScriptResult<FLOAT> {
            Ok(bus.engine.bus_gain(bus.index).map_err(script_error)? as FLOAT)
        })
        .register_fn("set_gain", |bus: BusHandle, gain: Dynamic| -> ScriptResult<()> {
            let gain = number(&gain).ok_or_else(|| script_error("gain must be a number"))?;
            bus.engine.set_bus_gain(bus.index, gain as f32).map_err(script_error)
        })
        .register_fn("pan", |bus: BusHandle| -> ScriptResult<FLOAT> {
            Ok(bus.engine.bus_pan(bus.index).map_err(script_error)? as FLOAT)
        })
        .register_fn("set_pan", |bus: BusHandle, pan: Dynamic| -> ScriptResult<()> {
            let pan = number(&pan).ok_or_else(|| script_error("pan must be a number"))?;
            bus.engine.set_bus_pan(bus.index, pan as f32).map_err(script_error)
        })
        .register_fn("add_effect", |bus: BusHandle, tag: &str| -> ScriptResult<EffectHandle> {
            let slot = bus.engine.add_bus_effect(bus.index, tag).map_err(script_error)?;
            Ok(bus.effect(slot))
        })
        .register_fn("effects", |bus: BusHandle| -> ScriptResult<Array> {
            let count = bus.engine.bus_effects(bus.index).map_err(script_error)?.len();
            Ok((0..count).map(|slot| Dynamic::from(bus.effect(slot))).collect())
        })
        .register_fn("to_string", |bus: BusHandle| format!("Bus({})", bus.index))
        .register_fn("to_debug", |bus: BusHandle| format!("Bus({})", bus.index));
}

fn register_effect(engine: &mut rhai::Engine) {
    engine
        .register_type_with_name::<EffectHandle>("Effect")
        .register_fn("tag", |fx: EffectHandle| -> ScriptResult<String> {
            Ok(fx.engine.effect_tag(fx.bus, fx.slot).map_err(script_error)?.to_string())
        })
        .register_fn(
            "set_parameter",
            |fx: EffectHandle, name: &str, value: Dynamic| -> ScriptResult<()> {
                let value = number(&value)
                    .ok_or_else(|| script_error(format!("value of '{}' must be a number", name)))?;
                fx.engine
                    .set_effect_parameter(fx.bus, fx.slot, name, value as f32)
                    .map_err(script_error)
            },
        )
        .register_fn("get_parameter", |fx: EffectHandle, name: &str| -> ScriptResult<FLOAT> {
            let value = fx
                .engine
                .effect_parameter(fx.bus, fx.slot, name)
                .map_err(script_error)?;
            Ok(value as FLOAT)
        })
        .register_fn("parameters", |fx: EffectHandle| -> ScriptResult<Map> {
            let params = fx
                .engine
                .effect_parameters(fx.bus, fx.slot)
                .map_err(script_error)?;
            Ok(params
                .into_iter()
                .map(|(name, value)| (name.into(), Dynamic::from_float(value as FLOAT)))
                .collect())
        })
        .register_fn("to_string", |fx: EffectHandle| {
            format!("Effect({}.{})", fx.bus, fx.slot)
        })
        .register_fn("to_debug", |fx: EffectHandle| {
            format!("Effect({}.{})", fx.bus, fx.slot)
        });
}

fn register_console(engine: &mut rhai::Engine) {
    engine
        .register_type_with_name::<ConsoleApi>("Console")
        .register_fn("log", |c: ConsoleApi, a: Dynamic| c.log(&[a]))
        .register_fn("log", |c: ConsoleApi, a: Dynamic, b: Dynamic| c.log(&[a, b]))
        .register_fn("log", |c: ConsoleApi, a: Dynamic, b: Dynamic, d: Dynamic| {
            c.log(&[a, b, d])
        })
        .register_fn(
            "log",
            |c: ConsoleApi, a: Dynamic, b: Dynamic, d: Dynamic, e: Dynamic| c.log(&[a, b, d, e]),
        )
        .register_fn(
            "log",
            |c: ConsoleApi, a: Dynamic, b: Dynamic, d: Dynamic, e: Dynamic, f: Dynamic| {
                c.log(&[a, b, d, e, f])
            },
        )
        .register_fn(
            "log",
            |c: ConsoleApi,
             a: Dynamic,
             b: Dynamic,
             d: Dynamic,
             e: Dynamic,
             f: Dynamic,
             g: Dynamic| { c.log(&[a, b, d, e, f, g]) },
        );
}

fn register_timers(engine: &mut rhai::Engine, tasks: TaskQueue<WorkerTask>) {
    let schedule = move |callback: FnPtr, ms: INT| -> INT {
        let delay = Duration::from_millis(ms.max(0) as u64);
        tasks
            .post_delayed(WorkerTask::Script(callback), delay)
            .map(|id| id.get() as INT)
            .unwrap_or(0)
    };
    let alias = schedule.clone();
    engine
        .register_fn("set_timeout", schedule)
        .register_fn("setTimeout", alias);
}

/// Registers every native type and function, and resolves the globals
/// `engine`, `console` and `content_dir`.
pub fn register(engine: &mut rhai::Engine, api: EngineApi, tasks: TaskQueue<WorkerTask>) {
    register_engine(engine);
    register_bus(engine);
    register_effect(engine);
    register_console(engine);
    register_timers(engine, tasks);

    let console = Dynamic::from(ConsoleApi {
        console: api.console.clone(),
    });
    let content_dir = Dynamic::from(api.content_dir.to_string_lossy().to_string());
    let engine_api = Dynamic::from(api);
    engine.on_var(move |name, index, _context| {
        // Locals shadow the globals.
        if index > 0 {
            return Ok(None);
        }
        Ok(match name {
            "engine" => Some(engine_api.clone()),
            "console" => Some(console.clone()),
            "content_dir" => Some(content_dir.clone()),
            _ => None,
        })
    });
}
