// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Operation primitives (C1) and the transform engine (C2).
//!
//! An [`Operation`] is a sequence of [`Primitive`]s that reads a document left
//! to right and produces a new one. Operations are plain value types: they
//! carry no identity, no revision, no author. Everything revision-related
//! lives one layer up, in [`crate::document`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OtError;

/// One step of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Primitive {
    Retain { count: u64 },
    Insert { text: String },
    Delete { count: u64 },
}

/// An ordered sequence of [`Primitive`]s, always kept in canonical form
/// (see [`Operation::compact`]).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(pub Vec<Primitive>);

/// Which side of a concurrent pair an operation is on, for breaking ties
/// between two inserts at the same position. See [`transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl Operation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(&mut self, count: u64) -> &mut Self {
        if count > 0 {
            self.0.push(Primitive::Retain { count });
        }
        self
    }

    pub fn insert(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if !text.is_empty() {
            self.0.push(Primitive::Insert { text });
        }
        self
    }

    pub fn delete(&mut self, count: u64) -> &mut Self {
        if count > 0 {
            self.0.push(Primitive::Delete { count });
        }
        self
    }

    /// `Σ retain + Σ delete`: the length of document this operation expects to read.
    #[must_use]
    pub fn base_len(&self) -> u64 {
        self.0
            .iter()
            .map(|p| match p {
                Primitive::Retain { count } | Primitive::Delete { count } => *count,
                Primitive::Insert { .. } => 0,
            })
            .sum()
    }

    /// `Σ retain + Σ insert.len()`: the length of document this operation produces.
    #[must_use]
    pub fn target_len(&self) -> u64 {
        self.0
            .iter()
            .map(|p| match p {
                Primitive::Retain { count } => *count,
                Primitive::Insert { text } => text.chars().count() as u64,
                Primitive::Delete { .. } => 0,
            })
            .sum()
    }

    /// True iff lengths line up, every count is non-zero, every insert is non-empty.
    #[must_use]
    pub fn validate(&self, base_len: u64) -> bool {
        if self.base_len() != base_len {
            return false;
        }
        self.0.iter().all(|p| match p {
            Primitive::Retain { count } | Primitive::Delete { count } => *count >= 1,
            Primitive::Insert { text } => !text.is_empty(),
        })
    }

    /// Merge adjacent same-kind primitives and drop zero-count entries.
    /// Idempotent: `compact(compact(op)) == compact(op)`.
    #[must_use]
    pub fn compact(mut self) -> Self {
        let mut out: Vec<Primitive> = Vec::with_capacity(self.0.len());
        for p in self.0.drain(..) {
            let is_zero = matches!(
                &p,
                Primitive::Retain { count: 0 } | Primitive::Delete { count: 0 }
            );
            if is_zero {
                continue;
            }
            match (out.last_mut(), &p) {
                (Some(Primitive::Retain { count: a }), Primitive::Retain { count: b }) => {
                    *a += b;
                }
                (Some(Primitive::Delete { count: a }), Primitive::Delete { count: b }) => {
                    *a += b;
                }
                (Some(Primitive::Insert { text: a }), Primitive::Insert { text: b }) => {
                    a.push_str(b);
                }
                _ => out.push(p),
            }
        }
        Self(out)
    }

    /// Apply this operation to `content`, reading it left to right under a
    /// cursor. Fails with [`OtError::InvalidOperation`] if the operation would
    /// read past the end of `content`.
    pub fn apply(&self, content: &str) -> Result<String, OtError> {
        let chars: Vec<char> = content.chars().collect();
        let base_len = chars.len() as u64;
        let mut cursor: usize = 0;
        let mut result = String::with_capacity(content.len());

        for primitive in &self.0 {
            match primitive {
                Primitive::Retain { count } => {
                    let count = *count as usize;
                    let end = cursor
                        .checked_add(count)
                        .filter(|&e| e <= chars.len())
                        .ok_or(OtError::InvalidOperation {
                            base_len: base_len as usize,
                        })?;
                    result.extend(&chars[cursor..end]);
                    cursor = end;
                }
                Primitive::Insert { text } => {
                    result.push_str(text);
                }
                Primitive::Delete { count } => {
                    let count = *count as usize;
                    cursor = cursor
                        .checked_add(count)
                        .filter(|&e| e <= chars.len())
                        .ok_or(OtError::InvalidOperation {
                            base_len: base_len as usize,
                        })?;
                }
            }
        }
        if cursor != chars.len() {
            return Err(OtError::InvalidOperation {
                base_len: base_len as usize,
            });
        }
        Ok(result)
    }

    /// Compose `self` (base -> mid) with `other` (mid -> result) into a single
    /// operation (base -> result). Used to collapse a run of history entries
    /// into one operation and exercised by the TP1 property tests.
    ///
    /// `self`'s deletes never appear in `mid`, so they pass straight through.
    /// `other`'s inserts add text that wasn't there in `mid` as far as `self`
    /// is concerned, so they also pass straight through. What's left is
    /// `self`'s inserts meeting `other`'s retain/delete (kept or cancelled)
    /// and `self`'s retains meeting `other`'s retain/delete (kept or turned
    /// into a real delete).
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        let mut walker = Walker::new(self, other);
        let mut out = Operation::new();
        loop {
            match (walker.peek_left(), walker.peek_right()) {
                (None, None) => break,
                (Some(Primitive::Delete { count }), _) => {
                    out.delete(count);
                    walker.advance_left_whole();
                }
                (_, Some(Primitive::Insert { text })) => {
                    out.insert(text);
                    walker.advance_right_whole();
                }
                (Some(Primitive::Insert { text }), Some(Primitive::Delete { count })) => {
                    // `other` deletes text `self` just inserted: cancels out.
                    let step = (text.chars().count() as u64).min(count);
                    walker.advance_left(step);
                    walker.advance_right(step);
                }
                (Some(Primitive::Insert { text }), Some(Primitive::Retain { count })) => {
                    let step = (text.chars().count() as u64).min(count);
                    let chunk: String = text.chars().take(step as usize).collect();
                    out.insert(chunk);
                    walker.advance_left(step);
                    walker.advance_right(step);
                }
                (Some(Primitive::Retain { count: lc }), Some(Primitive::Delete { count: rc })) => {
                    let step = lc.min(rc);
                    out.delete(step);
                    walker.advance_left(step);
                    walker.advance_right(step);
                }
                (Some(Primitive::Retain { count: lc }), Some(Primitive::Retain { count: rc })) => {
                    let step = lc.min(rc);
                    out.retain(step);
                    walker.advance_left(step);
                    walker.advance_right(step);
                }
                (None, Some(_)) | (Some(_), None) => {
                    unreachable!("compose requires self.target_len() == other.base_len()")
                }
            }
        }
        out.compact()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

fn min_step(a: &Primitive, b: &Primitive) -> u64 {
    let a = match a {
        Primitive::Retain { count } | Primitive::Delete { count } => *count,
        Primitive::Insert { .. } => u64::MAX,
    };
    let b = match b {
        Primitive::Retain { count } | Primitive::Delete { count } => *count,
        Primitive::Insert { .. } => u64::MAX,
    };
    a.min(b)
}

/// Walks two operations "inside out": each `peek`/`advance` call deals in
/// whatever is left of the *current* primitive, splitting it if only part of
/// it is consumed this step — including insert text, sliced by character
/// offset, so a `compose` step can consume part of an insert without
/// consuming the rest. Shared between [`Operation::compose`] and
/// [`transform`] (which never needs the partial-insert case, since it only
/// ever consumes an insert whole).
struct Walker<'a> {
    left: &'a [Primitive],
    right: &'a [Primitive],
    left_idx: usize,
    right_idx: usize,
    left_offset: u64,
    right_offset: u64,
}

impl<'a> Walker<'a> {
    fn new(left: &'a Operation, right: &'a Operation) -> Self {
        Self {
            left: &left.0,
            right: &right.0,
            left_idx: 0,
            right_idx: 0,
            left_offset: 0,
            right_offset: 0,
        }
    }

    fn peek_left(&self) -> Option<Primitive> {
        Self::peek(self.left, self.left_idx, self.left_offset)
    }

    fn peek_right(&self) -> Option<Primitive> {
        Self::peek(self.right, self.right_idx, self.right_offset)
    }

    fn peek(ops: &[Primitive], idx: usize, offset: u64) -> Option<Primitive> {
        let p = ops.get(idx)?;
        Some(match p {
            Primitive::Retain { count } => Primitive::Retain {
                count: count - offset,
            },
            Primitive::Delete { count } => Primitive::Delete {
                count: count - offset,
            },
            Primitive::Insert { text } => Primitive::Insert {
                text: text.chars().skip(offset as usize).collect(),
            },
        })
    }

    /// Consume `n` units (chars for an insert, count for retain/delete) from
    /// the head of the left side, splitting the current primitive if only
    /// part of it is consumed.
    fn advance_left(&mut self, n: u64) {
        let cur = countable_len(&self.peek_left().expect("advance_left past end"));
        if n < cur {
            self.left_offset += n;
        } else {
            self.left_idx += 1;
            self.left_offset = 0;
        }
    }

    fn advance_left_whole(&mut self) {
        self.left_idx += 1;
        self.left_offset = 0;
    }

    fn advance_right(&mut self, n: u64) {
        let cur = countable_len(&self.peek_right().expect("advance_right past end"));
        if n < cur {
            self.right_offset += n;
        } else {
            self.right_idx += 1;
            self.right_offset = 0;
        }
    }

    fn advance_right_whole(&mut self) {
        self.right_idx += 1;
        self.right_offset = 0;
    }
}

fn countable_len(p: &Primitive) -> u64 {
    match p {
        Primitive::Retain { count } | Primitive::Delete { count } => *count,
        Primitive::Insert { text } => text.chars().count() as u64,
    }
}

/// Transform `op1` against `op2`, both defined against the same base
/// document, producing `op1'` such that applying `op2` then `op1'` converges
/// with applying `op1` then `transform(op2, op1, side.flip())` (the TP1
/// property). `side` breaks ties when both operations insert at the same
/// position: the `Side::Left` operation's insert is ordered after the
/// other's.
pub fn transform(op1: &Operation, op2: &Operation, side: Side) -> Result<Operation, OtError> {
    if op1.base_len() != op2.base_len() {
        return Err(OtError::IncompatibleOperations {
            left: op1.base_len() as usize,
            right: op2.base_len() as usize,
        });
    }

    let mut walker = Walker::new(op1, op2);
    let mut out = Operation::new();

    loop {
        match (walker.peek_left(), walker.peek_right()) {
            (None, None) => break,
            (Some(Primitive::Insert { text: lt }), Some(Primitive::Insert { text: rt })) => {
                match side {
                    Side::Left => {
                        // op2's insert is ordered first: retain past it, then emit ours.
                        out.retain(rt.chars().count() as u64);
                        out.insert(lt);
                    }
                    Side::Right => {
                        out.insert(lt);
                        out.retain(rt.chars().count() as u64);
                    }
                }
                walker.advance_left_whole();
                walker.advance_right_whole();
            }
            (Some(Primitive::Insert { text }), _) => {
                out.insert(text);
                walker.advance_left_whole();
            }
            (_, Some(Primitive::Insert { text })) => {
                out.retain(text.chars().count() as u64);
                walker.advance_right_whole();
            }
            (None, _) | (_, None) => unreachable!("length mismatch in transform"),
            (Some(l), Some(r)) => {
                let step = min_step(&l, &r);
                match (&l, &r) {
                    (Primitive::Retain { .. }, Primitive::Retain { .. }) => {
                        out.retain(step);
                    }
                    (Primitive::Retain { .. }, Primitive::Delete { .. }) => {
                        // op2 deleted text op1 only retained: nothing survives into op1'.
                    }
                    (Primitive::Delete { .. }, Primitive::Retain { .. }) => {
                        out.delete(step);
                    }
                    (Primitive::Delete { .. }, Primitive::Delete { .. }) => {
                        // Both delete the same text; already gone for op1'.
                    }
                    _ => unreachable!(),
                }
                walker.advance_left(step);
                walker.advance_right(step);
            }
        }
    }

    Ok(out.compact())
}

/// The `Retain(len)` operation: applying it is a no-op, and transforming any
/// operation against it yields the operation unchanged (modulo `compact`).
#[must_use]
pub fn identity(len: u64) -> Operation {
    let mut op = Operation::new();
    op.retain(len);
    op
}
