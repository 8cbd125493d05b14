use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::Exception;
use crate::location::Location;
use crate::script::Script;

/// The host services the evaluator consumes: a console sink (the target of
/// `echo`) and script loading (the `file` builtin).  Concurrent script
/// evaluations require disjoint `System` instances.
pub trait System {
    fn console(&mut self) -> &mut dyn Write;

    fn load_script(&mut self, path: &Path, ctx: &Location) -> Result<Arc<Script>, Exception>;
}

/// A `System` that buffers console output in memory and loads scripts from
/// the file system.  The `Interpreter` façade drains the buffer after each
/// run.
#[derive(Default)]
pub struct BufferSystem {
    pub(crate) out: Vec<u8>,
}

impl BufferSystem {
    pub fn new() -> BufferSystem {
        BufferSystem { out: Vec::new() }
    }
}

impl System for BufferSystem {
    fn console(&mut self) -> &mut dyn Write {
        &mut self.out
    }

    fn load_script(&mut self, path: &Path, ctx: &Location) -> Result<Arc<Script>, Exception> {
        let source = fs::read_to_string(path).map_err(|e| {
            Exception::at(
                ctx.clone(),
                format!("file: can't open {}: {}", path.display(), e),
            )
        })?;
        Ok(Script::new(path.display().to_string(), source))
    }
}
