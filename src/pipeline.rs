use crate::command::Command;
use crate::engine::{Engine, parse_argv};
use crate::error::MnemoResult;
use crate::reply::Reply;

/// A batch of commands submitted together.
///
/// Commands run in submission order while no other pipeline runs. Single
/// commands from other callers may still interleave. Each command gets
/// its own slot in the result: a failing command (including one that did
/// not parse) does not stop the ones after it.
pub struct Pipeline<'a> {
    engine: &'a Engine,
    queued: Vec<MnemoResult<Command>>,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Pipeline {
            engine,
            queued: Vec::new(),
        }
    }

    pub fn push(&mut self, cmd: Command) -> &mut Self {
        self.queued.push(Ok(cmd));
        self
    }

    /// Queue a command given as `argv`. A parse error is kept and reported
    /// in this command's slot.
    pub fn push_args<A: AsRef<[u8]>>(&mut self, argv: &[A]) -> &mut Self {
        self.queued.push(parse_argv(argv));
        self
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn execute(self) -> Vec<MnemoResult<Reply>> {
        let engine = self.engine;
        let _gate = engine.lock_pipeline();
        self.queued
            .into_iter()
            .map(|cmd| cmd.and_then(|cmd| engine.execute(cmd)))
            .collect()
    }
}
