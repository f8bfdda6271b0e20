// Pagination walk
//
// Requests page 1, 2, ... of the same query and decodes each page on its
// own. Nothing is carried between pages except the page counter, the
// accumulated elements and the pages that were skipped.

use std::future::Future;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::Error;

/// Page size requested when the caller does not pick one.
pub const DEFAULT_PAGE_SIZE: u64 = 25;

/// How the endpoint signals that no more pages follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Termination {
    /// Stop once the walk has fetched `pageCount` pages.
    #[default]
    PageCount,
    /// Stop at the first page holding fewer than `pageSize` elements.
    ShortPage,
}

/// What to do when one page's elements do not decode as `T`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ElementErrorPolicy {
    /// Return the error and stop walking.
    #[default]
    Abort,
    /// Record the page in [`WalkOutcome::skipped`] and continue.
    SkipPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub page_size: u64,
    pub termination: Termination,
    pub on_element_error: ElementErrorPolicy,
    /// Upper bound on pages fetched, for endpoints whose counters cannot be trusted.
    pub max_pages: Option<u64>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            termination: Termination::default(),
            on_element_error: ElementErrorPolicy::default(),
            max_pages: None,
        }
    }
}

/// A page whose elements were skipped under [`ElementErrorPolicy::SkipPage`].
#[derive(Debug)]
pub struct SkippedPage {
    pub page: u64,
    pub error: Error,
}

#[derive(Debug)]
pub struct WalkOutcome<T> {
    pub elements: Vec<T>,
    pub pages_visited: u64,
    /// `resultTotal` as reported by the last page fetched.
    pub result_total: u64,
    pub skipped: Vec<SkippedPage>,
}

impl<T> WalkOutcome<T> {
    /// `true` when every page decoded.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Walk every page of a collection.
///
/// `fetch(page, page_size)` fetches and decodes one envelope. A malformed
/// envelope or transport failure ends the walk with that error. Element
/// failures follow `options.on_element_error`.
pub async fn walk<T, F, Fut>(options: &WalkOptions, mut fetch: F) -> Result<WalkOutcome<T>, Error>
where
    T: DeserializeOwned,
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Envelope, Error>>,
{
    let mut outcome = WalkOutcome {
        elements: Vec::new(),
        pages_visited: 0,
        result_total: 0,
        skipped: Vec::new(),
    };
    let mut page: u64 = 1;

    loop {
        if options.max_pages.is_some_and(|max| outcome.pages_visited >= max) {
            warn!(
                pages = outcome.pages_visited,
                "walk stopped at max_pages before the last page"
            );
            break;
        }

        let envelope = fetch(page, options.page_size).await?;
        outcome.pages_visited += 1;
        outcome.result_total = envelope.result_total();

        // `None` when a skipped page's element count is unknown.
        let received = match envelope.elements::<T>() {
            Ok(elements) => {
                let received = elements.len();
                outcome.elements.extend(elements);
                Some(received)
            }
            Err(error)
                if error.is_element_decode()
                    && options.on_element_error == ElementErrorPolicy::SkipPage =>
            {
                warn!(page, %error, "skipping page whose elements failed to decode");
                outcome.skipped.push(SkippedPage { page, error });
                envelope.element_count()
            }
            Err(error) => return Err(error),
        };

        let last = match (options.termination, received) {
            (Termination::PageCount, _) => page >= envelope.page_count(),
            (Termination::ShortPage, Some(received)) => {
                let received = u64::try_from(received).unwrap_or(u64::MAX);
                received == 0 || received < envelope.page_size()
            }
            (Termination::ShortPage, None) => {
                warn!(
                    page,
                    page_count = envelope.page_count(),
                    "element count of skipped page unknown, ending on pageCount"
                );
                page >= envelope.page_count()
            }
        };
        if last {
            break;
        }
        page += 1;
    }

    debug!(
        pages = outcome.pages_visited,
        elements = outcome.elements.len(),
        skipped = outcome.skipped.len(),
        result_total = outcome.result_total,
        "walk finished"
    );
    Ok(outcome)
}
