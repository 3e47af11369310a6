//! `kestrel run FILE` — execute a script and exit 0 on success, 1 on
//! uncaught error (spec.md §6).

use anyhow::{anyhow, Result};
use kestrel_core::VmError;
use kestrel_interpreter::Context;
use std::path::Path;

pub fn run(entry: &Path) -> Result<()> {
    let source = std::fs::read_to_string(entry)
        .map_err(|e| anyhow!("cannot read {}: {e}", entry.display()))?;

    let ctx = Context::new();
    let filename = entry.to_string_lossy();
    match ctx.evaluate(&source, &filename) {
        Ok(_) => Ok(()),
        Err(err) => Err(anyhow!(format_uncaught(&err))),
    }
}

/// Render an uncaught `VmError` the way the embedder-facing report in
/// spec.md §7 describes: the error's `name: message` header followed by
/// `    at <function> (<file>:<line>:<column>)` frames when available.
pub fn format_uncaught(err: &VmError) -> String {
    match err {
        VmError::Exception(thrown) => thrown.stack_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_syntax_errors_without_a_stack() {
        let err = VmError::syntax_error("unexpected token");
        assert_eq!(format_uncaught(&err), "SyntaxError: unexpected token");
    }
}
