//! Paginated loading of the destination index.

use crate::error::IndexError;
use crate::store::DestinationStore;
use vaultsync_core::DestinationIndex;

/// Pages allowed beyond the ones the reported total calls for.
pub const EXTRA_PAGES: usize = 3;

/// Loads a snapshot of every object in `store`.
///
/// Pages are requested with the greatest key seen so far as the marker
/// until the number of distinct records reaches the total reported by
/// [`DestinationStore::stats`]. An empty page ends the listing early. A
/// store that keeps returning the same page cannot loop forever: after
/// `ceil(total / page_size) + EXTRA_PAGES` requests the load fails with
/// [`IndexError::PageLimitExceeded`].
///
/// # Errors
///
/// Returns an error if a store call fails or the page cap is exceeded.
pub fn load_destination_index<S>(store: &S, page_size: usize) -> Result<DestinationIndex, IndexError>
where
    S: DestinationStore + ?Sized,
{
    let page_size = page_size.max(1);
    let total = store.stats()?.object_count;
    let cap = (total as usize).div_ceil(page_size) + EXTRA_PAGES;
    let mut index = DestinationIndex::new();
    let mut pages = 0usize;

    tracing::info!(total, page_size, "loading destination index");

    while (index.len() as u64) < total {
        if pages >= cap {
            return Err(IndexError::PageLimitExceeded {
                pages,
                loaded: index.len(),
                total,
            });
        }
        let marker = index.last_id().cloned();
        let page = store.list_page(marker.as_ref(), page_size)?;
        pages += 1;

        if page.is_empty() {
            tracing::warn!(
                loaded = index.len(),
                total,
                "destination listing ended before reported total"
            );
            break;
        }

        let before = index.len();
        for record in page {
            index.insert(record);
        }
        tracing::debug!(page = pages, added = index.len() - before, "loaded index page");
    }

    tracing::info!(objects = index.len(), pages, "destination index loaded");
    Ok(index)
}
