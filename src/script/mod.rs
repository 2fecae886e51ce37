//! Control-script runtime living on the worker thread.

pub mod bindings;
pub mod trigger;

use crate::bridge::WorkerTask;
use crate::console::Console;
use crate::log_debug;
use crate::midi::MidiMessage;
use crate::queue::TaskQueue;
use bindings::EngineApi;
use player_engine::EngineHandle;
use rhai::{CallFnOptions, Dynamic, EvalAltResult, FnPtr, Map, ParseError, Scope, AST, FLOAT, INT};
use std::path::PathBuf;

/// Names accepted for the MIDI handler, in lookup order.
pub const MIDI_HANDLER_NAMES: [&str; 2] = ["onMidiMessage", "on_midi_message"];

/// Converts a MIDI message into the map handed to the script handler.
pub fn midi_to_map(message: &MidiMessage) -> Map {
    let mut map = Map::new();
    map.insert("noteOn".into(), message.is_note_on().into());
    map.insert("noteOff".into(), message.is_note_off().into());
    map.insert("controller".into(), message.is_controller().into());
    map.insert("channel".into(), (message.channel() as INT).into());
    map.insert("timestamp".into(), (message.timestamp as FLOAT).into());
    if message.is_note_on() || message.is_note_off() {
        map.insert("noteNumber".into(), (message.note_number() as INT).into());
        map.insert(
            "velocity".into(),
            (message.velocity_as_float() as FLOAT).into(),
        );
    }
    if message.is_controller() {
        map.insert(
            "controllerNumber".into(),
            (message.controller_number() as INT).into(),
        );
        map.insert(
            "controllerValue".into(),
            (message.controller_value_as_float() as FLOAT).into(),
        );
    }
    map
}

pub struct ScriptHost {
    engine: rhai::Engine,
    ast: AST,
    scope: Scope<'static>,
    console: Console,
    handler: Option<&'static str>,
}

impl ScriptHost {
    pub fn new(
        engine: EngineHandle,
        console: Console,
        tasks: TaskQueue<WorkerTask>,
        content_dir: PathBuf,
    ) -> Self {
        let mut script_engine = rhai::Engine::new();
        let printer = console.clone();
        script_engine
            .on_print(move |text| printer.post_message(text))
            .on_debug(|text, source, pos| {
                let source = source.map(|s| format!("({s}) ")).unwrap_or_default();
                log_debug!("Script @ {source}{pos} : {text}");
            });
        bindings::register(
            &mut script_engine,
            EngineApi::new(engine, console.clone(), content_dir),
            tasks,
        );
        Self {
            engine: script_engine,
            ast: AST::empty(),
            scope: Scope::new(),
            console,
            handler: None,
        }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> &mut rhai::Engine {
        &mut self.engine
    }

    /// Compiles `source` and runs its top level once. Any failure is
    /// reported on the console; returns whether the script loaded cleanly.
    pub fn load(&mut self, source: &str) -> bool {
        self.scope.clear();
        self.handler = None;
        self.ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                self.report_parse_error(&err);
                self.ast = AST::empty();
                return false;
            }
        };

        let handler = MIDI_HANDLER_NAMES.iter().copied().find(|name| {
            self.ast
                .iter_functions()
                .any(|f| f.name == *name && f.params.len() == 1)
        });
        self.handler = handler;

        match self.engine.run_ast_with_scope(&mut self.scope, &self.ast) {
            Ok(()) => true,
            Err(err) => {
                self.report("*** Error ***", *err);
                false
            }
        }
    }

    pub fn has_midi_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Calls the script's MIDI handler, if it defines one.
    pub fn handle_midi(&mut self, message: &MidiMessage) {
        let Some(name) = self.handler else {
            return;
        };
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.scope,
            &self.ast,
            name,
            (midi_to_map(message),),
        );
        if let Err(err) = result {
            self.report("*** onMidiMessage Exception ***", *err);
        }
    }

    /// Runs a callback scheduled with `set_timeout`.
    pub fn run_callback(&mut self, callback: &FnPtr) {
        if let Err(err) = callback.call::<Dynamic>(&self.engine, &self.ast, ()) {
            self.report("*** Timeout Callback Exception ***", *err);
        }
    }

    /// Evaluates an expression against the loaded script's globals.
    pub fn eval(&mut self, expression: &str) -> Option<Dynamic> {
        match self
            .engine
            .eval_with_scope::<Dynamic>(&mut self.scope, expression)
        {
            Ok(value) => Some(value),
            Err(err) => {
                self.report("*** Error ***", *err);
                None
            }
        }
    }

    fn report(&self, header: &str, mut err: EvalAltResult) {
        let position = err.take_position();
        self.console.post_message(header);
        self.console.post_message(err.to_string());
        if !position.is_none() {
            self.console.post_message(format!("  at {}", position));
        }
    }

    fn report_parse_error(&self, err: &ParseError) {
        self.console.post_message("*** Error ***");
        self.console.post_message(err.0.to_string());
        if !err.1.is_none() {
            self.console.post_message(format!("  at {}", err.1));
        }
    }
}

#[cfg(test)]
mod tests;
