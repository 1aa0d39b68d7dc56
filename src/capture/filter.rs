use log::{debug, info};
use pcap::{BpfProgram, Capture, Linktype};
use std::fmt;

use crate::utils::error::FilterError;

/// A validated capture filter and the expression it was built from
///
/// An empty expression is the no-op filter: nothing is compiled and every
/// frame is accepted.
pub struct CompiledFilter {
    expression: String,
    program: Option<BpfProgram>,
}

impl CompiledFilter {
    /// Filter that accepts everything
    pub fn none() -> Self {
        Self {
            expression: String::new(),
            program: None,
        }
    }

    /// The expression as the operator typed it (trimmed)
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the filter restricts anything
    pub fn is_noop(&self) -> bool {
        self.program.is_none()
    }

    /// Run the compiled program in userspace against an Ethernet frame
    pub fn matches(&self, frame: &[u8]) -> bool {
        match &self.program {
            Some(program) => program.filter(frame),
            None => true,
        }
    }
}

impl fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("expression", &self.expression)
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// Validates BPF expressions before any device is touched
pub struct FilterCompiler {
    link_type: Linktype,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCompiler {
    /// Compiler for Ethernet frames
    pub fn new() -> Self {
        Self::for_link_type(Linktype::ETHERNET)
    }

    pub fn for_link_type(link_type: Linktype) -> Self {
        Self { link_type }
    }

    /// Compile `expr` against the link type; empty or blank input is the no-op filter
    pub fn compile(&self, expr: &str) -> Result<CompiledFilter, FilterError> {
        let expression = expr.trim();
        if expression.is_empty() {
            debug!("Empty filter expression, capturing everything");
            return Ok(CompiledFilter::none());
        }

        let compile_error = |reason: String| FilterError::Compile {
            expression: expression.to_string(),
            reason,
        };

        let dead = Capture::dead(self.link_type).map_err(|e| compile_error(e.to_string()))?;
        let program = dead
            .compile(expression, true)
            .map_err(|e| compile_error(e.to_string()))?;

        info!("Compiled filter: {}", expression);
        Ok(CompiledFilter {
            expression: expression.to_string(),
            program: Some(program),
        })
    }
}
