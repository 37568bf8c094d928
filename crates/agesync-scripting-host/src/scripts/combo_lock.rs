use std::any::Any;

use agesync_events::{AvatarId, ButtonId, InstanceId, ObjectKey, SdlValue, WorldEvent};
use agesync_world::config::PuzzleConfig;
use agesync_world::services::ResponderParams;
use agesync_world::{EventFilter, FaultKind, SdlError, VariableDescriptor};
use tracing::{debug, error, info, warn};

use crate::context::ScriptContext;
use crate::puzzle::{AttemptBuffer, ComboLockEngine, PuzzlePhase, PuzzleState, Transition};
use crate::Script;

/// A button combination lock.
///
/// Every client scores presses into the same replicated variables
/// (`<id>.solved`, `<id>.numCorrect`, `<id>.attempt`), but only the holder of
/// the puzzle object's token commits them. Everyone else follows along
/// through `VariableChanged`.
pub struct ComboLock {
    id: InstanceId,
    config: PuzzleConfig,
    engine: ComboLockEngine,
    filters: Vec<EventFilter>,
    governing: Vec<ObjectKey>,
    /// Press waiting on its responder: (ticket, button)
    pending_press: Option<(u64, ButtonId)>,
}

impl ComboLock {
    pub fn new(config: PuzzleConfig) -> Self {
        let filters = config
            .buttons
            .iter()
            .cloned()
            .map(EventFilter::Activator)
            .collect();
        Self {
            id: InstanceId::new(config.id.clone()),
            engine: ComboLockEngine::new(config.solution.clone(), config.mode, config.disable_on_solve),
            governing: vec![config.object.clone()],
            filters,
            config,
            pending_press: None,
        }
    }

    pub fn phase(&self) -> PuzzlePhase {
        self.engine.phase()
    }

    pub fn state(&self) -> &PuzzleState {
        self.engine.state()
    }

    pub fn config(&self) -> &PuzzleConfig {
        &self.config
    }

    fn is_own_variable(&self, name: &str) -> bool {
        name == self.config.solved_var()
            || name == self.config.correct_var()
            || name == self.config.attempt_var()
    }

    /// Rebuild local state from the shared variables. Returns false if they
    /// were inconsistent and had to be clamped.
    fn resync(&mut self, ctx: &ScriptContext<'_>) -> bool {
        let solved = ctx.read_bool(&self.config.solved_var()).unwrap_or(false);
        let num_correct = ctx.read_int(&self.config.correct_var()).unwrap_or(0);
        let attempt = ctx
            .read(&self.config.attempt_var())
            .and_then(|value| AttemptBuffer::from_value(value, self.config.solution.len()));

        let consistent = self.engine.restore(solved, num_correct, attempt);
        if !consistent {
            warn!(
                target: "puzzle",
                "{}: {} state (solved={}, numCorrect={}), clamped to 0",
                self.id,
                FaultKind::StaleOrMissingConfiguration,
                solved,
                num_correct
            );
        }
        consistent
    }

    /// Resync, and if we own the puzzle write back any clamped state
    fn resync_and_repair(&mut self, ctx: &mut ScriptContext<'_>) {
        if !self.resync(ctx) && ctx.is_owner(&self.config.object) {
            if let Err(e) = self.write_state(ctx, "clamp", true) {
                warn!(target: "puzzle", "{}: failed to repair state: {}", self.id, e);
            }
        }
    }

    /// Write the engine state. `solved_first` orders the writes so that
    /// observers never see solved without a full correct count.
    fn write_state(
        &self,
        ctx: &mut ScriptContext<'_>,
        tag: &str,
        solved_first: bool,
    ) -> Result<(), SdlError> {
        let state = self.engine.state();
        let solved = SdlValue::bool(state.solved);
        let correct = SdlValue::int(state.num_correct as i64);
        let attempt = state.attempt.to_value();

        if solved_first {
            ctx.write(&self.config.solved_var(), solved, tag)?;
            ctx.write(&self.config.correct_var(), correct, tag)?;
            ctx.write(&self.config.attempt_var(), attempt, tag)?;
        } else {
            ctx.write(&self.config.attempt_var(), attempt, tag)?;
            ctx.write(&self.config.correct_var(), correct, tag)?;
            ctx.write(&self.config.solved_var(), solved, tag)?;
        }
        Ok(())
    }

    fn on_press(&mut self, button: ButtonId, avatar: AvatarId, ctx: &mut ScriptContext<'_>) {
        if self.engine.is_locked() {
            debug!(target: "puzzle", "{}: button {} ignored while press responder plays", self.id, button);
            return;
        }
        if self.engine.state().solved && self.config.disable_on_solve {
            debug!(target: "puzzle", "{}: button {} ignored, puzzle is solved", self.id, button);
            return;
        }

        let Some(responder) = self.config.press_responder.clone() else {
            self.commit(button, ctx);
            return;
        };

        let params = ResponderParams {
            avatar: Some(avatar),
            button: Some(button),
            ..Default::default()
        };
        match ctx.run_responder(&responder, params, false) {
            Ok(ticket) => {
                self.engine.set_locked(true);
                self.pending_press = Some((ticket, button));
            }
            Err(e) => {
                error!(target: "puzzle", "{}: press of button {} aborted: {}", self.id, button, e);
            }
        }
    }

    /// Score a press and publish the result. Only the owner does this.
    fn commit(&mut self, button: ButtonId, ctx: &mut ScriptContext<'_>) {
        if !ctx.is_owner(&self.config.object) {
            debug!(
                target: "puzzle",
                "{}: not owner of {}, waiting for replicated result of button {}",
                self.id,
                self.config.object,
                button
            );
            return;
        }

        self.resync(ctx);
        let transition = self.engine.press(button);
        let written = match transition {
            Transition::Ignored => return,
            Transition::Progress(_) => self.write_state(ctx, "press", false),
            Transition::Reset => self.write_state(ctx, "reset", false),
            Transition::Solved => self.write_state(ctx, "solved", false),
            Transition::Unsolved => self.write_state(ctx, "unsolved", true),
        };

        if let Err(e) = written {
            warn!(target: "puzzle", "{}: press of button {} not committed: {}", self.id, button, e);
            self.resync(ctx);
            return;
        }

        match transition {
            Transition::Solved => {
                info!(target: "puzzle", "{}: solved by {}", self.id, ctx.client_id());
                self.mirror_solved(ctx);
                self.run_solved_responder(ctx, false, true);
            }
            Transition::Unsolved => {
                info!(target: "puzzle", "{}: reset from solved", self.id);
                self.mirror_solved(ctx);
            }
            Transition::Reset => {
                debug!(target: "puzzle", "{}: wrong button {}, starting over", self.id, button);
            }
            _ => {
                debug!(target: "puzzle", "{}: button {} -> {}", self.id, button, self.engine.phase());
            }
        }
    }

    /// Copy the solved flag into the age-level variable, if configured
    fn mirror_solved(&self, ctx: &mut ScriptContext<'_>) {
        let Some(name) = &self.config.solved_variable else {
            return;
        };
        let solved = self.engine.state().solved;
        if ctx.read_bool(name) == Some(solved) {
            return;
        }

        if let Err(e) = ctx.write(name, SdlValue::bool(solved), "mirror") {
            warn!(target: "puzzle", "{}: cannot mirror into '{}': {}", self.id, name, e);
            return;
        }
        if let Err(e) = ctx.export(name) {
            warn!(target: "puzzle", "{}: cannot export '{}': {}", self.id, name, e);
        }
    }

    fn run_solved_responder(&self, ctx: &mut ScriptContext<'_>, fast_forward: bool, net_propagate: bool) {
        let Some(responder) = self.config.solved_responder.clone() else {
            return;
        };
        let params = ResponderParams {
            fast_forward,
            ..Default::default()
        };
        if let Err(e) = ctx.run_responder(&responder, params, net_propagate) {
            error!(target: "puzzle", "{}: solved responder failed: {}", self.id, e);
        }
    }
}

impl Script for ComboLock {
    fn id(&self) -> &InstanceId {
        &self.id
    }

    fn name(&self) -> &'static str {
        "combo_lock"
    }

    fn description(&self) -> &'static str {
        "Button combination lock with replicated progress"
    }

    fn declared_variables(&self) -> Vec<VariableDescriptor> {
        let object = self.config.object.clone();
        let len = self.config.solution.len();
        let mut variables = vec![
            VariableDescriptor::new(self.config.solved_var(), SdlValue::bool(false), object.clone()),
            VariableDescriptor::new(self.config.correct_var(), SdlValue::int(0), object.clone()),
            VariableDescriptor::new(
                self.config.attempt_var(),
                AttemptBuffer::new(len).to_value(),
                object.clone(),
            ),
        ];
        // Declared with the rest so a join snapshot can fill it in. A
        // `[[variables]]` entry of the same name is declared first and wins.
        if let Some(name) = &self.config.solved_variable {
            variables.push(VariableDescriptor::new(name.clone(), SdlValue::bool(false), object));
        }
        variables
    }

    fn on_load(&mut self, ctx: &mut ScriptContext<'_>) {
        for name in [
            self.config.solved_var(),
            self.config.correct_var(),
            self.config.attempt_var(),
        ] {
            if let Err(e) = ctx.subscribe_variable(&name) {
                warn!(target: "puzzle", "{}: {}", self.id, e);
            }
        }

        ctx.acquire_if_vacant(&self.config.object);
        self.resync_and_repair(ctx);

        if self.engine.state().solved {
            debug!(target: "puzzle", "{}: loaded solved, fast-forwarding", self.id);
            if ctx.is_owner(&self.config.object) {
                self.mirror_solved(ctx);
            }
            self.run_solved_responder(ctx, true, false);
        }

        info!(
            target: "puzzle",
            "{}: loaded in phase {} (owner: {})",
            self.id,
            self.engine.phase(),
            ctx.is_owner(&self.config.object)
        );
    }

    fn on_unload(&mut self, ctx: &mut ScriptContext<'_>) {
        self.pending_press = None;
        self.engine.set_locked(false);
        ctx.release(&self.config.object);
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &self.filters
    }

    fn governing_objects(&self) -> &[ObjectKey] {
        &self.governing
    }

    fn on_event(&mut self, event: &WorldEvent, ctx: &mut ScriptContext<'_>) {
        match event {
            WorldEvent::Picked { activator, avatar } => {
                if let Some(button) = self.config.button_for(activator) {
                    self.on_press(button, *avatar, ctx);
                }
            }
            WorldEvent::ResponderCompleted { ticket, .. } => {
                if let Some((pending, button)) = self.pending_press {
                    if pending == *ticket {
                        self.pending_press = None;
                        self.engine.set_locked(false);
                        self.commit(button, ctx);
                    }
                }
            }
            WorldEvent::VariableChanged { name, writer, .. } => {
                if self.is_own_variable(name) && *writer != ctx.client_id() {
                    self.resync(ctx);
                    debug!(target: "puzzle", "{}: {} from {} -> {}", self.id, name, writer, self.engine.phase());
                }
            }
            _ => {}
        }
    }

    fn on_ownership_vacated(&mut self, object: &ObjectKey, ctx: &mut ScriptContext<'_>) {
        if ctx.acquire_if_vacant(object) {
            info!(target: "puzzle", "{}: took over {}", self.id, object);
            self.resync_and_repair(ctx);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
