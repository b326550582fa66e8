//! Merging several sorted sources into one paged stream.
//!
//! The pager keeps one cursor per source: the page it last fetched, the
//! token that page was fetched with, and how many of its items have been
//! consumed. Each call picks the globally smallest head item until the page
//! is full, refilling a source only once its buffer runs dry.
//!
//! The outgoing token composes one state per source:
//!
//! | State          | Meaning                                         |
//! |----------------|-------------------------------------------------|
//! | `Start`        | nothing consumed yet                            |
//! | `At(t, skip)`  | refetch the page at `t`, drop `skip` items       |
//! | `Done`         | source exhausted                                |
//!
//! Per-source tokens stay opaque; they are nested, not interpreted.

use futures::future::try_join_all;
use std::cmp::Ordering;
use strata_codec::{BinaryDecoder, BinaryEncoder, CodecResult};
use strata_schema::{Instance, Sort, ID};
use tracing::trace;

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PagingToken};
use crate::source::PagedSource;

const STATE_START: u8 = 0;
const STATE_AT: u8 = 1;
const STATE_DONE: u8 = 2;

/// Resume state of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceState {
    Start,
    At {
        token: Option<PagingToken>,
        skip: usize,
    },
    Done,
}

impl SourceState {
    fn write(&self, out: &mut BinaryEncoder) -> CodecResult<()> {
        match self {
            Self::Start => out.write_u8(STATE_START),
            Self::At { token, skip } => {
                out.write_u8(STATE_AT);
                out.write_bool(token.is_some());
                if let Some(token) = token {
                    out.write_string(token.as_str())?;
                }
                out.write_len(*skip)?;
            }
            Self::Done => out.write_u8(STATE_DONE),
        }
        Ok(())
    }

    fn read(input: &mut BinaryDecoder<'_>) -> StorageResult<Self> {
        Ok(match input.read_u8()? {
            STATE_START => Self::Start,
            STATE_AT => {
                let token = if input.read_bool()? {
                    Some(PagingToken::new(input.read_string()?))
                } else {
                    None
                };
                Self::At {
                    token,
                    skip: input.read_len()?,
                }
            }
            STATE_DONE => Self::Done,
            other => {
                return Err(StorageError::invalid_paging_token(format!(
                    "unknown source state {other}"
                )))
            }
        })
    }
}

fn encode_states(states: &[SourceState]) -> StorageResult<PagingToken> {
    let mut out = BinaryEncoder::new();
    out.write_len(states.len())?;
    for state in states {
        state.write(&mut out)?;
    }
    Ok(PagingToken::from_bytes(out.as_bytes()))
}

fn decode_states(token: &PagingToken, sources: usize) -> StorageResult<Vec<SourceState>> {
    let bytes = token.to_bytes()?;
    let mut input = BinaryDecoder::new(&bytes);
    let read = |input: &mut BinaryDecoder<'_>| -> StorageResult<Vec<SourceState>> {
        let len = input.read_len()?;
        if len != sources {
            return Err(StorageError::invalid_paging_token(format!(
                "token has {len} sources, query has {sources}"
            )));
        }
        (0..len).map(|_| SourceState::read(input)).collect()
    };
    let states = read(&mut input).map_err(|e| match e {
        StorageError::Codec(codec) => StorageError::invalid_paging_token(codec.to_string()),
        other => other,
    })?;
    if !input.is_empty() {
        return Err(StorageError::invalid_paging_token("trailing bytes"));
    }
    Ok(states)
}

struct Cursor<'s> {
    source: &'s dyn PagedSource,
    fetched: Option<PagingToken>,
    buffer: Vec<Instance>,
    pos: usize,
    next: Option<PagingToken>,
    loaded: bool,
    done: bool,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s dyn PagedSource, state: SourceState) -> Self {
        let (fetched, pos, done) = match state {
            SourceState::Start => (None, 0, false),
            SourceState::At { token, skip } => (token, skip, false),
            SourceState::Done => (None, 0, true),
        };
        Self {
            source,
            fetched,
            buffer: Vec::new(),
            pos,
            next: None,
            loaded: false,
            done,
        }
    }

    /// Makes sure a head item is buffered, unless the source is exhausted.
    async fn fill(&mut self, count: usize) -> StorageResult<()> {
        while !self.done && self.pos >= self.buffer.len() {
            let token = if self.loaded {
                match self.next.take() {
                    Some(next) => {
                        self.pos = 0;
                        Some(next)
                    }
                    None => {
                        self.done = true;
                        break;
                    }
                }
            } else {
                self.fetched.clone()
            };
            let page = self.source.page(count, token.as_ref()).await?;
            let (items, next) = page.into_parts();
            trace!(items = items.len(), more = next.is_some(), "fetched source page");
            self.fetched = token;
            self.buffer = items;
            self.next = next;
            self.loaded = true;
        }
        Ok(())
    }

    fn head(&self) -> Option<&Instance> {
        if self.done {
            None
        } else {
            self.buffer.get(self.pos)
        }
    }

    fn take(&mut self) -> Option<Instance> {
        let item = self.buffer.get_mut(self.pos).map(std::mem::take);
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn state(&self) -> SourceState {
        if self.done {
            return SourceState::Done;
        }
        if self.loaded && self.pos >= self.buffer.len() {
            return match &self.next {
                Some(next) => SourceState::At {
                    token: Some(next.clone()),
                    skip: 0,
                },
                None => SourceState::Done,
            };
        }
        match (&self.fetched, self.pos) {
            (None, 0) => SourceState::Start,
            (token, skip) => SourceState::At {
                token: token.clone(),
                skip,
            },
        }
    }
}

/// Merges sorted sources into globally ordered pages.
///
/// The comparator must be a total order consistent with every source's
/// own ordering; [`Pager::sorted`] builds one from sort keys with a
/// trailing ascending `id`.
pub struct Pager<F> {
    compare: F,
    sources: Vec<Box<dyn PagedSource>>,
    paging: Option<PagingToken>,
}

impl<F> std::fmt::Debug for Pager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("sources", &self.sources.len())
            .field("paging", &self.paging)
            .finish()
    }
}

impl<F> Pager<F>
where
    F: Fn(&Instance, &Instance) -> Ordering + Send + Sync,
{
    /// Creates a pager resuming from `paging` (the start when `None`).
    pub fn new(compare: F, sources: Vec<Box<dyn PagedSource>>, paging: Option<PagingToken>) -> Self {
        Self {
            compare,
            sources,
            paging,
        }
    }

    /// Fetches the next merged page of up to `count` items.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPagingToken`] if the token does not
    /// match these sources, or any error a source raises.
    pub async fn page(&self, count: usize) -> StorageResult<Page<Instance>> {
        let states = match &self.paging {
            Some(token) => decode_states(token, self.sources.len())?,
            None => vec![SourceState::Start; self.sources.len()],
        };
        if count == 0 {
            return Ok(Page::new(Vec::new(), self.paging.clone()));
        }
        let mut cursors: Vec<Cursor<'_>> = self
            .sources
            .iter()
            .zip(states)
            .map(|(source, state)| Cursor::new(source.as_ref(), state))
            .collect();
        try_join_all(cursors.iter_mut().map(|c| c.fill(count))).await?;

        let mut items = Vec::with_capacity(count.min(256));
        while items.len() < count {
            let mut best: Option<(usize, &Instance)> = None;
            for (i, cursor) in cursors.iter().enumerate() {
                if let Some(head) = cursor.head() {
                    match best {
                        Some((_, current)) if (self.compare)(head, current) != Ordering::Less => {}
                        _ => best = Some((i, head)),
                    }
                }
            }
            let Some((index, _)) = best else {
                break;
            };
            let cursor = &mut cursors[index];
            if let Some(item) = cursor.take() {
                items.push(item);
            }
            if items.len() < count {
                cursor.fill(count).await?;
            }
        }

        let states: Vec<SourceState> = cursors.iter().map(Cursor::state).collect();
        let paging = if states.iter().all(|s| *s == SourceState::Done) {
            None
        } else {
            Some(encode_states(&states)?)
        };
        Ok(Page::new(items, paging))
    }
}

/// Orders instances by sort keys, then ascending id.
pub fn sort_comparator(sort: Vec<Sort>) -> impl Fn(&Instance, &Instance) -> Ordering + Send + Sync {
    move |a: &Instance, b: &Instance| {
        Sort::compare_all_maps(&sort, a, b).then_with(|| a.id().cmp(&b.id()))
    }
}

impl Pager<Box<dyn Fn(&Instance, &Instance) -> Ordering + Send + Sync>> {
    /// A pager ordered by sort keys with `id` as the final tie-break.
    pub fn sorted(
        sort: &[Sort],
        sources: Vec<Box<dyn PagedSource>>,
        paging: Option<PagingToken>,
    ) -> Self {
        let compare: Box<dyn Fn(&Instance, &Instance) -> Ordering + Send + Sync> =
            Box::new(sort_comparator(sort.to_vec()));
        Self::new(compare, sources, paging)
    }
}

/// The sort keys a query orders by, with `id` appended when absent.
pub fn with_id_tiebreak(sort: &[Sort]) -> Vec<Sort> {
    let mut out = sort.to_vec();
    if !out.iter().any(|s| s.name().parts() == [ID]) {
        out.push(Sort::asc(ID));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ListSource;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use strata_codec::Value;

    fn numbered(prefix: &str, values: impl IntoIterator<Item = i64>) -> Vec<Instance> {
        values
            .into_iter()
            .map(|n| Instance::reference(format!("{prefix}{n:03}")).with("n", Value::Integer(n)))
            .collect()
    }

    fn by_n() -> Vec<Sort> {
        vec![Sort::asc("n")]
    }

    fn sources(lists: Vec<Vec<Instance>>) -> Vec<Box<dyn PagedSource>> {
        lists
            .into_iter()
            .map(|items| Box::new(ListSource::new(items)) as Box<dyn PagedSource>)
            .collect()
    }

    #[tokio::test]
    async fn merges_sixty_and_forty_over_three_pages() {
        let evens = numbered("a", (0..60).map(|i| i * 2));
        let odds = numbered("b", (0..40).map(|i| i * 2 + 1));
        let mut seen = Vec::new();
        let mut paging = None;
        for expected in [40, 40, 20] {
            let pager = Pager::sorted(&by_n(), sources(vec![evens.clone(), odds.clone()]), paging);
            let page = pager.page(40).await.unwrap();
            assert_eq!(page.len(), expected);
            seen.extend(page.items().iter().map(|i| i.id().unwrap_or_default().to_string()));
            paging = page.paging().cloned();
        }
        assert!(paging.is_none());
        assert_eq!(seen.len(), 100);
        assert_eq!(seen.iter().collect::<BTreeSet<_>>().len(), 100);

        let all: Vec<Instance> = {
            let mut all = evens.clone();
            all.extend(odds.clone());
            all.sort_by(sort_comparator(by_n()));
            all
        };
        let expected: Vec<String> = all.iter().map(|i| i.id().unwrap_or_default().to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn ties_go_to_the_earlier_source() {
        let first = numbered("x", [1, 2]);
        let second = numbered("y", [1, 2]);
        let compare = |a: &Instance, b: &Instance| Sort::asc("n").compare_maps(a, b);
        let page = Pager::new(compare, sources(vec![first, second]), None)
            .page(4)
            .await
            .unwrap();
        let ids: Vec<&str> = page.items().iter().filter_map(Instance::id).collect();
        assert_eq!(ids, ["x001", "y001", "x002", "y002"]);
        assert!(page.paging().is_none());
    }

    #[tokio::test]
    async fn no_sources_yields_empty_exhausted_page() {
        let page = Pager::sorted(&by_n(), Vec::new(), None).page(10).await.unwrap();
        assert!(page.is_empty());
        assert!(page.paging().is_none());
    }

    #[tokio::test]
    async fn token_from_other_query_is_rejected() {
        let pager = Pager::sorted(&by_n(), sources(vec![numbered("a", 0..10)]), None);
        let token = pager.page(3).await.unwrap().paging().cloned();
        let two = Pager::sorted(
            &by_n(),
            sources(vec![numbered("a", 0..10), numbered("b", 0..10)]),
            token,
        );
        assert!(matches!(
            two.page(3).await,
            Err(StorageError::InvalidPagingToken(_))
        ));
        let garbage = Pager::sorted(&by_n(), Vec::new(), Some(PagingToken::new("AAAA")));
        assert!(garbage.page(3).await.is_err());
    }

    struct Counting {
        inner: ListSource,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PagedSource for Counting {
        async fn page(
            &self,
            count: usize,
            paging: Option<&PagingToken>,
        ) -> StorageResult<Page<Instance>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.page(count, paging).await
        }
    }

    #[tokio::test]
    async fn refills_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Counting {
            inner: ListSource::new(numbered("a", 0..100)),
            calls: Arc::clone(&calls),
        };
        let pager = Pager::sorted(&by_n(), vec![Box::new(source)], None);
        let page = pager.page(10).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert!(page.paging().is_some());
    }

    #[test]
    fn id_tiebreak_is_appended_once() {
        assert_eq!(with_id_tiebreak(&by_n()), vec![Sort::asc("n"), Sort::asc(ID)]);
        assert_eq!(with_id_tiebreak(&[Sort::desc(ID)]), vec![Sort::desc(ID)]);
    }
}
