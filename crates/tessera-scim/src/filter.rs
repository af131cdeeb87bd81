// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-clause attribute filters: `<attribute> <operator> <value>`.
//!
//! Compilation never fails. A filter that cannot be understood compiles to
//! [`CompiledFilter::FailOpen`], which matches every resource and carries the
//! reason so callers can log and count it.

use std::fmt;
use std::str::FromStr;

use winnow::ascii::space0;
use winnow::combinator::delimited;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take_while;

use crate::resource::{ScimGroup, ScimUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Ne,
	Co,
	Sw,
	Ew,
	Pr,
	Gt,
	Ge,
	Lt,
	Le,
}

impl FromStr for CompareOp {
	type Err = FailOpenReason;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"eq" => Ok(CompareOp::Eq),
			"ne" => Ok(CompareOp::Ne),
			"co" => Ok(CompareOp::Co),
			"sw" => Ok(CompareOp::Sw),
			"ew" => Ok(CompareOp::Ew),
			"pr" => Ok(CompareOp::Pr),
			"gt" => Ok(CompareOp::Gt),
			"ge" => Ok(CompareOp::Ge),
			"lt" => Ok(CompareOp::Lt),
			"le" => Ok(CompareOp::Le),
			_ => Err(FailOpenReason::UnknownOperator(s.to_string())),
		}
	}
}

impl CompareOp {
	/// Equality, substring and affix operators ignore case. Ordering
	/// operators compare the raw string forms.
	pub fn apply(self, actual: &str, expected: &str) -> bool {
		match self {
			CompareOp::Eq => actual.to_lowercase() == expected.to_lowercase(),
			CompareOp::Ne => actual.to_lowercase() != expected.to_lowercase(),
			CompareOp::Co => actual.to_lowercase().contains(&expected.to_lowercase()),
			CompareOp::Sw => actual.to_lowercase().starts_with(&expected.to_lowercase()),
			CompareOp::Ew => actual.to_lowercase().ends_with(&expected.to_lowercase()),
			CompareOp::Pr => !actual.is_empty(),
			CompareOp::Gt => actual > expected,
			CompareOp::Ge => actual >= expected,
			CompareOp::Lt => actual < expected,
			CompareOp::Le => actual <= expected,
		}
	}
}

impl fmt::Display for CompareOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			CompareOp::Eq => "eq",
			CompareOp::Ne => "ne",
			CompareOp::Co => "co",
			CompareOp::Sw => "sw",
			CompareOp::Ew => "ew",
			CompareOp::Pr => "pr",
			CompareOp::Gt => "gt",
			CompareOp::Ge => "ge",
			CompareOp::Lt => "lt",
			CompareOp::Le => "le",
		};
		f.write_str(s)
	}
}

/// Why a filter string was not understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOpenReason {
	Empty,
	TooFewTokens(usize),
	UnknownOperator(String),
	UnterminatedQuote,
	TrailingInput(String),
}

impl FailOpenReason {
	/// Stable label for metrics.
	pub fn label(&self) -> &'static str {
		match self {
			FailOpenReason::Empty => "empty",
			FailOpenReason::TooFewTokens(_) => "too_few_tokens",
			FailOpenReason::UnknownOperator(_) => "unknown_operator",
			FailOpenReason::UnterminatedQuote => "unterminated_quote",
			FailOpenReason::TrailingInput(_) => "trailing_input",
		}
	}
}

impl fmt::Display for FailOpenReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FailOpenReason::Empty => write!(f, "empty filter"),
			FailOpenReason::TooFewTokens(n) => write!(f, "expected 3 tokens, found {n}"),
			FailOpenReason::UnknownOperator(op) => write!(f, "unknown operator '{op}'"),
			FailOpenReason::UnterminatedQuote => write!(f, "unterminated quoted value"),
			FailOpenReason::TrailingInput(rest) => write!(f, "unexpected input '{rest}'"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
	pub attribute: String,
	pub op: CompareOp,
	pub value: String,
}

impl FilterExpression {
	pub fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
		let actual = target.resolve_attribute(&normalize_path(&self.attribute));
		self.op.apply(&actual, &self.value)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledFilter {
	Expression(FilterExpression),
	FailOpen(FailOpenReason),
}

impl CompiledFilter {
	pub fn compile(input: &str) -> Self {
		match parse_clause(input) {
			Ok(expr) => CompiledFilter::Expression(expr),
			Err(reason) => CompiledFilter::FailOpen(reason),
		}
	}

	pub fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
		match self {
			CompiledFilter::Expression(expr) => expr.matches(target),
			CompiledFilter::FailOpen(_) => true,
		}
	}

	pub fn fail_open_reason(&self) -> Option<&FailOpenReason> {
		match self {
			CompiledFilter::FailOpen(reason) => Some(reason),
			CompiledFilter::Expression(_) => None,
		}
	}

	pub fn expression(&self) -> Option<&FilterExpression> {
		match self {
			CompiledFilter::Expression(expr) => Some(expr),
			CompiledFilter::FailOpen(_) => None,
		}
	}
}

fn word<'i>(input: &mut &'i str) -> Result<&'i str, ContextError> {
	take_while(1.., |c: char| !c.is_whitespace()).parse_next(input)
}

fn quoted<'i>(input: &mut &'i str) -> Result<&'i str, ContextError> {
	delimited('"', take_while(0.., |c: char| c != '"'), '"').parse_next(input)
}

fn skip_space(input: &mut &str) {
	let _: Result<&str, ContextError> = space0.parse_next(input);
}

fn parse_clause(input: &str) -> Result<FilterExpression, FailOpenReason> {
	let mut rest = input.trim();
	if rest.is_empty() {
		return Err(FailOpenReason::Empty);
	}

	let attribute = word(&mut rest).map_err(|_| FailOpenReason::Empty)?;
	skip_space(&mut rest);
	let op_token = word(&mut rest).map_err(|_| FailOpenReason::TooFewTokens(1))?;
	let op = CompareOp::from_str(op_token)?;
	skip_space(&mut rest);

	if op == CompareOp::Pr {
		if !rest.is_empty() {
			return Err(FailOpenReason::TrailingInput(rest.to_string()));
		}
		return Ok(FilterExpression {
			attribute: attribute.to_string(),
			op,
			value: String::new(),
		});
	}

	if rest.is_empty() {
		return Err(FailOpenReason::TooFewTokens(2));
	}

	let value = if rest.starts_with('"') {
		quoted(&mut rest).map_err(|_| FailOpenReason::UnterminatedQuote)?
	} else {
		word(&mut rest).map_err(|_| FailOpenReason::TooFewTokens(2))?
	};
	skip_space(&mut rest);
	if !rest.is_empty() {
		return Err(FailOpenReason::TrailingInput(rest.to_string()));
	}

	Ok(FilterExpression {
		attribute: attribute.to_string(),
		op,
		value: value.to_string(),
	})
}

/// Lowercases a path and strips a leading schema URN, so
/// `urn:ietf:params:scim:schemas:core:2.0:User:userName` becomes `username`.
pub fn normalize_path(path: &str) -> String {
	let lowered = path.trim().to_ascii_lowercase();
	if lowered.starts_with("urn:") {
		if let Some(idx) = lowered.rfind(':') {
			return lowered[idx + 1..].to_string();
		}
	}
	lowered
}

/// A resource whose attributes can be resolved by normalized path.
///
/// Unresolvable attributes resolve to the empty string.
pub trait FilterTarget {
	fn resolve_attribute(&self, path: &str) -> String;
}

impl FilterTarget for ScimUser {
	fn resolve_attribute(&self, path: &str) -> String {
		let name = self.name.as_ref();
		let value = match path {
			"username" => Some(self.user_name.clone()),
			"displayname" => self.display_name.clone(),
			"active" => Some(self.active.to_string()),
			"externalid" => self.external_id.clone(),
			"id" => self.id.clone(),
			"emails" | "emails.value" => self.emails.first().map(|e| e.value.clone()),
			"emails.type" => self.emails.first().and_then(|e| e.email_type.clone()),
			"name.givenname" => name.and_then(|n| n.given_name.clone()),
			"name.familyname" => name.and_then(|n| n.family_name.clone()),
			"name.formatted" => name.and_then(|n| n.formatted.clone()),
			"groups" | "groups.value" => self.groups.first().map(|g| g.value.clone()),
			"groups.display" => self.groups.first().and_then(|g| g.display.clone()),
			"meta.created" => self.meta.as_ref().map(|m| m.created.to_rfc3339()),
			"meta.lastmodified" => self.meta.as_ref().map(|m| m.last_modified.to_rfc3339()),
			_ => None,
		};
		value.unwrap_or_default()
	}
}

impl FilterTarget for ScimGroup {
	fn resolve_attribute(&self, path: &str) -> String {
		let value = match path {
			"displayname" => Some(self.display_name.clone()),
			"externalid" => self.external_id.clone(),
			"id" => self.id.clone(),
			"members" | "members.value" => self.members.first().map(|m| m.value.clone()),
			"members.display" => self.members.first().and_then(|m| m.display.clone()),
			"meta.created" => self.meta.as_ref().map(|m| m.created.to_rfc3339()),
			"meta.lastmodified" => self.meta.as_ref().map(|m| m.last_modified.to_rfc3339()),
			_ => None,
		};
		value.unwrap_or_default()
	}
}
