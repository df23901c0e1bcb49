//! Stateful filter builder driven by the expression compiler.
//!
//! The assembler keeps two scope stacks. Filter-level frames live inside one open parameter
//! filter and end up inside its `$elemMatch`. Document-level frames group completed element
//! matches and direct filters. The first boolean operator seen outside a parameter is the
//! implicit root and is never pushed.

use super::filter::Filter;
use crate::constants::{fields, ops};
use crate::expression::BooleanOperator;
use crate::{Error, Result};
use serde_json::{json, Value as JsonValue};

#[derive(Debug)]
struct Frame {
    operator: BooleanOperator,
    items: Vec<Filter>,
}

impl Frame {
    fn new(operator: BooleanOperator) -> Self {
        Self {
            operator,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootState {
    Unclaimed,
    Open(BooleanOperator),
    Closed(BooleanOperator),
}

#[derive(Debug)]
pub struct QueryAssembler {
    /// Conditions of the open parameter filter, if any.
    current: Option<Vec<Filter>>,
    filter_stack: Vec<Frame>,
    document_stack: Vec<Frame>,
    root: RootState,
    negation_depth: usize,
    completed: Vec<Filter>,
}

impl Default for QueryAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryAssembler {
    pub fn new() -> Self {
        Self {
            current: None,
            filter_stack: Vec::new(),
            document_stack: Vec::new(),
            root: RootState::Unclaimed,
            negation_depth: 0,
            completed: Vec::new(),
        }
    }

    pub fn negation_depth(&self) -> usize {
        self.negation_depth
    }

    /// Number of filters emitted so far at document level.
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    pub fn start_new_filter(&mut self) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::AssemblerState(
                "a parameter filter is already open".to_string(),
            ));
        }
        self.current = Some(Vec::new());
        Ok(())
    }

    /// Wraps the open filter's conditions into one element match over `searchIndexes`.
    ///
    /// Emits nothing when no condition was added.
    pub fn complete_filter(&mut self) -> Result<()> {
        if !self.filter_stack.is_empty() {
            return Err(Error::AssemblerState(format!(
                "{} operator scope(s) still open inside the parameter filter",
                self.filter_stack.len()
            )));
        }
        let conditions = self.current.take().ok_or_else(|| {
            Error::AssemblerState("complete_filter called without start_new_filter".to_string())
        })?;
        if conditions.is_empty() {
            return Ok(());
        }
        self.emit(Filter::elem_match(fields::SEARCH_INDEXES, conditions));
        Ok(())
    }

    /// Adds a leaf condition to the open parameter filter, negated when inside a `Not`.
    pub fn add_condition(&mut self, condition: Filter) -> Result<()> {
        let condition = if self.negation_depth > 0 {
            condition.negate()
        } else {
            condition
        };
        self.add_scope_condition(condition)
    }

    /// Adds a condition that is never negated, such as the parameter-code match that scopes
    /// an element match.
    pub fn add_scope_condition(&mut self, condition: Filter) -> Result<()> {
        if let Some(frame) = self.filter_stack.last_mut() {
            frame.items.push(condition);
            return Ok(());
        }
        match self.current.as_mut() {
            Some(conditions) => {
                conditions.push(condition);
                Ok(())
            }
            None => Err(Error::AssemblerState(
                "condition added outside a parameter filter".to_string(),
            )),
        }
    }

    /// Adds a document-level filter that bypasses the element-match wrapper.
    pub fn add_filter(&mut self, filter: Filter) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::AssemblerState(
                "direct filter added while a parameter filter is open".to_string(),
            ));
        }
        let filter = if self.negation_depth > 0 {
            filter.negate()
        } else {
            filter
        };
        self.emit(filter);
        Ok(())
    }

    pub fn push_multiary_operator(&mut self, operator: BooleanOperator) {
        if self.current.is_some() {
            self.filter_stack.push(Frame::new(operator));
        } else if self.root == RootState::Unclaimed && self.document_stack.is_empty() {
            self.root = RootState::Open(operator);
        } else {
            self.document_stack.push(Frame::new(operator));
        }
    }

    /// Closes the innermost scope and merges its items into the parent as one group.
    pub fn pop_multiary_operator(&mut self) -> Result<()> {
        if self.current.is_some() {
            let frame = self.filter_stack.pop().ok_or_else(|| {
                Error::AssemblerState("operator pop without matching push".to_string())
            })?;
            let parent_is_and = self
                .filter_stack
                .last()
                .map_or(true, |f| f.operator == BooleanOperator::And);
            let merged = merge_frame(frame, parent_is_and);
            let target = match self.filter_stack.last_mut() {
                Some(parent) => &mut parent.items,
                None => self.current.as_mut().ok_or_else(|| {
                    Error::AssemblerState("parameter filter closed during pop".to_string())
                })?,
            };
            target.extend(merged);
            return Ok(());
        }

        if let Some(frame) = self.document_stack.pop() {
            let parent_is_and = match self.document_stack.last() {
                Some(parent) => parent.operator == BooleanOperator::And,
                None => self.root_operator() != Some(BooleanOperator::Or),
            };
            for filter in merge_frame(frame, parent_is_and) {
                self.emit(filter);
            }
            return Ok(());
        }

        match self.root {
            RootState::Open(op) => {
                self.root = RootState::Closed(op);
                Ok(())
            }
            _ => Err(Error::AssemblerState(
                "operator pop without matching push".to_string(),
            )),
        }
    }

    pub fn push_negation(&mut self) {
        self.negation_depth += 1;
    }

    pub fn pop_negation(&mut self) -> Result<()> {
        if self.negation_depth == 0 {
            return Err(Error::AssemblerState(
                "negation pop without matching push".to_string(),
            ));
        }
        self.negation_depth -= 1;
        Ok(())
    }

    /// Final filter fragment: completed filters followed by the soft-delete exclusion.
    pub fn into_filter(self) -> Result<Filter> {
        if self.current.is_some() {
            return Err(Error::AssemblerState(
                "parameter filter left open".to_string(),
            ));
        }
        if !self.document_stack.is_empty() || matches!(self.root, RootState::Open(_)) {
            return Err(Error::AssemblerState(
                "operator scope left open".to_string(),
            ));
        }
        if self.negation_depth != 0 {
            return Err(Error::AssemblerState(format!(
                "negation depth is {} at render",
                self.negation_depth
            )));
        }

        let root_is_or = self.root_operator() == Some(BooleanOperator::Or);
        let mut conjuncts = if root_is_or && self.completed.len() > 1 {
            vec![Filter::or(self.completed)]
        } else {
            self.completed
        };
        conjuncts.push(Filter::field(fields::IS_DELETED, json!(false)));
        Ok(Filter::and(conjuncts))
    }

    /// Renders `{"$and": [completed..., {"isDeleted": false}]}`.
    ///
    /// Consumes the assembler, so a compile is rendered exactly once.
    pub fn render_filters(self) -> Result<JsonValue> {
        Ok(self.into_filter()?.render())
    }

    fn root_operator(&self) -> Option<BooleanOperator> {
        match self.root {
            RootState::Open(op) | RootState::Closed(op) => Some(op),
            RootState::Unclaimed => None,
        }
    }

    fn emit(&mut self, filter: Filter) {
        match self.document_stack.last_mut() {
            Some(frame) => frame.items.push(filter),
            None => self.completed.push(filter),
        }
    }
}

/// Turns a closed frame into the fragments to append to its parent.
///
/// A conjunction closing into a conjunctive parent is spliced in. A single-member group is
/// unwrapped. An empty frame contributes nothing.
fn merge_frame(frame: Frame, parent_is_and: bool) -> Vec<Filter> {
    let Frame { operator, items } = frame;
    if items.len() <= 1 {
        return items;
    }
    match operator {
        BooleanOperator::And if parent_is_and => items,
        BooleanOperator::And => vec![Filter::and(items)],
        BooleanOperator::Or => vec![Filter::or(items)],
    }
}

/// `{"searchIndexes.SearchParameter.Code": {"$nin": [code]}}`
pub fn missing_parameter_filter(code: &str) -> Filter {
    Filter::field(
        crate::constants::search_index_code_path(),
        json!({ (ops::NIN): [code] }),
    )
}
