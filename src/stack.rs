//! Loop frame stack.
//!
//! Each `in` clause pushes one [`Frame`]. File frames own the record
//! they loaded; field frames only hold a `[start, stop)` window and read
//! their bytes through the nearest file frame beneath them. Frames are
//! always removed top-down, so a field window never outlives the record
//! it points into.
//!
//! Moving between elements is driven by an explicit two-state machine
//! (see [`Step`]): *resetting* a frame establishes its first element
//! relative to the frame below, *advancing* moves it to its next one.
//! Exhaustion bubbles down the chain, success descends back up and
//! restarts every chained frame above from its first element.

use tracing::{debug, trace};

use crate::error::ErrorKind;
use crate::reader;
use crate::registry::Registry;
use crate::scanner;

/// The segment a frame iterates, as a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    File(usize),
    Field(usize),
}

/// One resolved `in` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause {
    pub segment: Segment,
    /// `Some(i)` for single-shot indexed access, `None` for a loop.
    pub index: Option<usize>,
}

#[derive(Debug)]
pub struct Frame {
    pub segment: Segment,
    pub index: Option<usize>,
    /// Pushed as a `.`-continuation of the frame below it.
    pub chained: bool,
    /// Statement to jump back to for the next iteration.
    pub resume: usize,
    /// The matching `out` statement.
    pub exit: usize,
    pub start: usize,
    pub stop: usize,
    // Only file frames fill this.
    record: Vec<u8>,
}

impl Frame {
    const fn new(clause: Clause, chained: bool, resume: usize, exit: usize) -> Self {
        Self {
            segment: clause.segment,
            index: clause.index,
            chained,
            resume,
            exit,
            start: 0,
            stop: 0,
            record: Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.index.is_none()
    }
}

/// Where a chain ended up after entering or advancing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Every frame of the chain holds an element.
    Ready,
    /// The chain's head ran out; the chain has been removed.
    Exhausted,
}

/// Result of `out`/`cont` on the innermost chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Run the loop body again from this statement.
    Resume(usize),
    /// The chain is finished; its `out` is at `exit`.
    Done { exit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reset(usize),
    Advance(usize),
}

#[derive(Debug)]
pub struct LoopStack {
    frames: Vec<Frame>,
    chunk_size: usize,
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn segment_name(registry: &Registry, segment: Segment) -> String {
    match segment {
        Segment::File(slot) => lossy(&registry.file(slot).name),
        Segment::Field(slot) => lossy(&registry.field(slot).name),
    }
}

impl LoopStack {
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            frames: Vec::new(),
            chunk_size,
        }
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Bytes backing the frame at `depth`: the record of the nearest
    /// file frame at or below it.
    fn backing(&self, depth: usize) -> &[u8] {
        self.frames[..=depth]
            .iter()
            .rev()
            .find(|frame| matches!(frame.segment, Segment::File(_)))
            .map_or(&[], |frame| frame.record.as_slice())
    }

    fn parent_window(&self, depth: usize) -> Option<(usize, usize)> {
        let parent = self.frames.get(depth.checked_sub(1)?)?;
        Some((parent.start, parent.stop))
    }

    /// Current element of the frame at `depth`.
    #[must_use]
    pub fn element(&self, depth: usize) -> &[u8] {
        let Some(frame) = self.frames.get(depth) else {
            return &[];
        };
        self.backing(depth)
            .get(frame.start..frame.stop)
            .unwrap_or(&[])
    }

    /// Current element of the innermost frame.
    #[must_use]
    pub fn current(&self) -> Option<&[u8]> {
        let depth = self.frames.len().checked_sub(1)?;
        Some(self.element(depth))
    }

    /// Current element of the innermost frame iterating `segment`.
    #[must_use]
    pub fn current_of(&self, segment: Segment) -> Option<&[u8]> {
        let depth = self.frames.iter().rposition(|f| f.segment == segment)?;
        Some(self.element(depth))
    }

    /// Field `index` of the innermost frame's current element.
    pub fn field_of_current(
        &self,
        registry: &Registry,
        slot: usize,
        index: usize,
    ) -> Result<&[u8], ErrorKind> {
        let field = registry.field(slot);
        let depth = self
            .frames
            .len()
            .checked_sub(1)
            .ok_or_else(|| ErrorKind::FieldOutsideLoop(lossy(&field.name)))?;
        let frame = &self.frames[depth];
        let buf = self.backing(depth);
        let start = scanner::skip_fields(buf, &field.delimiter, index, frame.start, frame.stop)
            .ok_or_else(|| ErrorKind::OutOfRange {
                segment: lossy(&field.name),
                index,
            })?;
        let stop = scanner::field_end(buf, &field.delimiter, start, frame.stop);
        Ok(&buf[start..stop])
    }

    /// Index of the first frame of the innermost chain.
    fn chain_head(&self) -> Option<usize> {
        let mut depth = self.frames.len().checked_sub(1)?;
        while depth > 0 && self.frames[depth].chained {
            depth -= 1;
        }
        Some(depth)
    }

    /// Push one frame per clause and establish their first elements.
    ///
    /// On [`Settled::Exhausted`] nothing was pushed and the caller must
    /// skip the loop body.
    pub fn enter(
        &mut self,
        registry: &mut Registry,
        clauses: &[Clause],
        resume: usize,
        exit: usize,
    ) -> Result<Settled, ErrorKind> {
        if clauses.is_empty() {
            return Ok(Settled::Exhausted);
        }
        let head = self.frames.len();
        for (position, clause) in clauses.iter().enumerate() {
            self.frames
                .push(Frame::new(*clause, position > 0, resume, exit));
        }
        debug!(
            depth = head,
            segment = %segment_name(registry, clauses[0].segment),
            chain = clauses.len(),
            "entering in block"
        );

        let settled = self.settle(registry, Step::Reset(head), head)?;
        if settled == Settled::Exhausted {
            debug!(depth = head, "in block empty, skipping body");
            self.frames.truncate(head);
        }
        Ok(settled)
    }

    /// Move the innermost chain to its next element. `None` when no loop
    /// is open.
    pub fn advance(&mut self, registry: &mut Registry) -> Result<Option<Advance>, ErrorKind> {
        let Some(head) = self.chain_head() else {
            return Ok(None);
        };
        let top = self.frames.len() - 1;
        let resume = self.frames[top].resume;
        let exit = self.frames[top].exit;

        match self.settle(registry, Step::Advance(top), head)? {
            Settled::Ready => Ok(Some(Advance::Resume(resume))),
            Settled::Exhausted => {
                debug!(depth = head, "in block exhausted");
                self.frames.truncate(head);
                Ok(Some(Advance::Done { exit }))
            }
        }
    }

    /// Drop the innermost chain, returning its `out` statement.
    pub fn unwind(&mut self) -> Option<usize> {
        let head = self.chain_head()?;
        let exit = self.frames[head].exit;
        debug!(depth = head, "breaking out of in block");
        self.frames.truncate(head);
        Some(exit)
    }

    fn settle(
        &mut self,
        registry: &mut Registry,
        mut step: Step,
        head: usize,
    ) -> Result<Settled, ErrorKind> {
        let top = self.frames.len() - 1;
        loop {
            trace!(?step, "settling chain");
            step = match step {
                Step::Reset(depth) => {
                    if self.reset(registry, depth)? {
                        if depth == top {
                            return Ok(Settled::Ready);
                        }
                        Step::Reset(depth + 1)
                    } else if depth == head {
                        return Ok(Settled::Exhausted);
                    } else {
                        Step::Advance(depth - 1)
                    }
                }
                Step::Advance(depth) => {
                    if self.step_forward(registry, depth)? {
                        if depth == top {
                            return Ok(Settled::Ready);
                        }
                        Step::Reset(depth + 1)
                    } else if depth == head {
                        return Ok(Settled::Exhausted);
                    } else {
                        Step::Advance(depth - 1)
                    }
                }
            };
        }
    }

    /// Establish the first (or indexed) element of the frame at `depth`.
    /// `Ok(false)` means a loop frame has no elements at all.
    fn reset(&mut self, registry: &mut Registry, depth: usize) -> Result<bool, ErrorKind> {
        let Frame { segment, index, .. } = self.frames[depth];
        match segment {
            Segment::File(slot) => {
                let file = registry.file_mut(slot);
                let frame = &mut self.frames[depth];
                let found = reader::load_record(
                    &mut frame.record,
                    &mut file.source,
                    &file.delimiter,
                    index.unwrap_or(0),
                    self.chunk_size,
                )?;
                if !found {
                    return match index {
                        Some(index) => Err(ErrorKind::OutOfRange {
                            segment: lossy(&file.name),
                            index,
                        }),
                        None => Ok(false),
                    };
                }
                frame.start = 0;
                frame.stop = frame.record.len();
                Ok(true)
            }
            Segment::Field(slot) => {
                let field = registry.field(slot);
                let (from, to) = self
                    .parent_window(depth)
                    .ok_or_else(|| ErrorKind::FieldOutsideLoop(lossy(&field.name)))?;
                let buf = self.backing(depth - 1);
                let start = match index {
                    Some(index) => scanner::skip_fields(buf, &field.delimiter, index, from, to)
                        .ok_or_else(|| ErrorKind::OutOfRange {
                            segment: lossy(&field.name),
                            index,
                        })?,
                    None => match scanner::first_field(buf, &field.delimiter, from, to) {
                        Some(start) => start,
                        None => return Ok(false),
                    },
                };
                let stop = scanner::field_end(buf, &field.delimiter, start, to);
                let frame = &mut self.frames[depth];
                frame.start = start;
                frame.stop = stop;
                Ok(true)
            }
        }
    }

    /// Move the frame at `depth` to its next element. Single-shot frames
    /// have none.
    fn step_forward(&mut self, registry: &mut Registry, depth: usize) -> Result<bool, ErrorKind> {
        if !self.frames[depth].is_loop() {
            return Ok(false);
        }
        let Frame { segment, stop, .. } = self.frames[depth];
        match segment {
            Segment::File(slot) => {
                let file = registry.file_mut(slot);
                let frame = &mut self.frames[depth];
                if !reader::load_record(
                    &mut frame.record,
                    &mut file.source,
                    &file.delimiter,
                    0,
                    self.chunk_size,
                )? {
                    return Ok(false);
                }
                frame.start = 0;
                frame.stop = frame.record.len();
                Ok(true)
            }
            Segment::Field(slot) => {
                let delimiter = &registry.field(slot).delimiter;
                let Some((_, to)) = self.parent_window(depth) else {
                    return Ok(false);
                };
                let buf = self.backing(depth - 1);
                let Some(start) = scanner::next_field(buf, delimiter, stop, to) else {
                    return Ok(false);
                };
                let stop = scanner::field_end(buf, delimiter, start, to);
                let frame = &mut self.frames[depth];
                frame.start = start;
                frame.stop = stop;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::scanner::Delimiter;

    struct Fixture {
        registry: Registry,
        stack: LoopStack,
        files: Vec<NamedTempFile>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Registry::new(),
                stack: LoopStack::new(4),
                files: Vec::new(),
            }
        }

        fn file(&mut self, name: &str, content: &[u8], delimiter: Delimiter) -> Segment {
            let mut tmp = NamedTempFile::new().expect("tempfile");
            tmp.write_all(content).expect("write");
            let slot = self
                .registry
                .declare_file(name.as_bytes(), tmp.path(), delimiter)
                .expect("declare file");
            self.files.push(tmp);
            Segment::File(slot)
        }

        fn field(&mut self, name: &str, delimiter: Delimiter) -> Segment {
            let slot = self
                .registry
                .declare_field(name.as_bytes(), delimiter)
                .expect("declare field");
            Segment::Field(slot)
        }

        fn enter(&mut self, clauses: &[Clause]) -> Result<Settled, ErrorKind> {
            self.stack.enter(&mut self.registry, clauses, 1, 9)
        }

        fn advance(&mut self) -> Advance {
            self.stack
                .advance(&mut self.registry)
                .expect("advance")
                .expect("open loop")
        }

        fn current(&self) -> String {
            String::from_utf8_lossy(self.stack.current().expect("frame")).into_owned()
        }

        /// Run the chain to exhaustion, collecting the innermost element
        /// of each iteration.
        fn drain(&mut self, clauses: &[Clause]) -> Vec<String> {
            let mut seen = Vec::new();
            if self.enter(clauses).expect("enter") == Settled::Exhausted {
                return seen;
            }
            loop {
                seen.push(self.current());
                if let Advance::Done { .. } = self.advance() {
                    return seen;
                }
            }
        }
    }

    const fn open(segment: Segment) -> Clause {
        Clause {
            segment,
            index: None,
        }
    }

    const fn at(segment: Segment, index: usize) -> Clause {
        Clause {
            segment,
            index: Some(index),
        }
    }

    #[test]
    fn file_loop_yields_every_record() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"alpha\nbeta\ngamma\n", Delimiter::newline());
        assert_eq!(fx.drain(&[open(rows)]), vec!["alpha", "beta", "gamma"]);
        assert!(fx.stack.frames().is_empty());
    }

    #[test]
    fn empty_file_skips_body() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"", Delimiter::newline());
        assert_eq!(fx.enter(&[open(rows)]), Ok(Settled::Exhausted));
        assert!(fx.stack.frames().is_empty());
    }

    #[test]
    fn indexed_file_is_single_shot() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"r0\nr1\nr2\n", Delimiter::newline());
        assert_eq!(fx.enter(&[at(rows, 1)]), Ok(Settled::Ready));
        assert_eq!(fx.current(), "r1");
        assert_eq!(fx.advance(), Advance::Done { exit: 9 });
    }

    #[test]
    fn indexed_file_out_of_range() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"r0\nr1\n", Delimiter::newline());
        assert_eq!(
            fx.enter(&[at(rows, 2)]),
            Err(ErrorKind::OutOfRange {
                segment: "rows".to_string(),
                index: 2,
            })
        );
    }

    #[test]
    fn field_without_parent() {
        let mut fx = Fixture::new();
        let cols = fx.field("cols", Delimiter::Whitespace);
        assert_eq!(
            fx.enter(&[open(cols)]),
            Err(ErrorKind::FieldOutsideLoop("cols".to_string()))
        );
    }

    #[test]
    fn chained_cross_product() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"a,b\nc\nd,e,f\n", Delimiter::newline());
        let cols = fx.field("cols", Delimiter::from_bytes(b","));
        assert_eq!(
            fx.drain(&[open(rows), open(cols)]),
            vec!["a", "b", "c", "d", "e", "f"]
        );
    }

    #[test]
    fn chained_descendant_restarts_after_outer_advance() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"x y\np q\n", Delimiter::newline());
        let words = fx.field("words", Delimiter::Whitespace);
        let chars = fx.field("chars", Delimiter::EachByte);
        assert_eq!(
            fx.drain(&[open(rows), open(words), open(chars)]),
            vec!["x", "y", "p", "q"]
        );
    }

    #[test]
    fn chain_skips_records_without_fields() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"a b\n   \nc\n", Delimiter::newline());
        let words = fx.field("words", Delimiter::Whitespace);
        assert_eq!(fx.drain(&[open(rows), open(words)]), vec!["a", "b", "c"]);
    }

    #[test]
    fn chain_with_indexed_inner_field() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"1,2,3\n4,5,6\n", Delimiter::newline());
        let cols = fx.field("cols", Delimiter::from_bytes(b","));
        assert_eq!(fx.drain(&[open(rows), at(cols, 2)]), vec!["3", "6"]);
    }

    #[test]
    fn nested_statements_keep_outer_frame() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"a,b\nc,d\n", Delimiter::newline());
        let cols = fx.field("cols", Delimiter::from_bytes(b","));
        assert_eq!(fx.enter(&[open(rows)]), Ok(Settled::Ready));
        // A separate `in` statement is its own chain.
        assert_eq!(fx.enter(&[open(cols)]), Ok(Settled::Ready));
        assert_eq!(fx.current(), "a");
        assert_eq!(fx.advance(), Advance::Resume(1));
        assert_eq!(fx.current(), "b");
        assert!(matches!(fx.advance(), Advance::Done { .. }));
        assert_eq!(fx.current(), "a,b");
        assert_eq!(fx.stack.frames().len(), 1);
    }

    #[test]
    fn unwind_drops_whole_chain() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"a,b\n", Delimiter::newline());
        let cols = fx.field("cols", Delimiter::from_bytes(b","));
        assert_eq!(fx.enter(&[open(rows), open(cols)]), Ok(Settled::Ready));
        assert_eq!(fx.stack.unwind(), Some(9));
        assert!(fx.stack.frames().is_empty());
        assert_eq!(fx.stack.unwind(), None);
    }

    #[test]
    fn field_lookup_on_current_element() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"k=v=w\n", Delimiter::newline());
        let Segment::Field(slot) = fx.field("parts", Delimiter::from_bytes(b"=")) else {
            unreachable!()
        };
        fx.enter(&[open(rows)]).expect("enter");
        assert_eq!(
            fx.stack.field_of_current(&fx.registry, slot, 1).expect("field"),
            b"v"
        );
        assert!(matches!(
            fx.stack.field_of_current(&fx.registry, slot, 3),
            Err(ErrorKind::OutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn current_of_finds_outer_frame() {
        let mut fx = Fixture::new();
        let rows = fx.file("rows", b"a b\n", Delimiter::newline());
        let words = fx.field("words", Delimiter::Whitespace);
        fx.enter(&[open(rows), open(words)]).expect("enter");
        assert_eq!(fx.stack.current_of(rows), Some(&b"a b"[..]));
        assert_eq!(fx.stack.current_of(words), Some(&b"a"[..]));
    }
}
