//! Splitting operations into size-limited bulk calls

/// Ceilings for a single bulk request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_bytes: usize,
}

impl BatchLimits {
    pub const fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items,
            max_bytes,
        }
    }

    /// One item per request, for endpoints without a bulk mode
    pub const fn single() -> Self {
        Self::new(1, usize::MAX)
    }
}

/// Bulk POST: FMC accepts at most 1000 objects and ~2 MB of JSON per call
pub const BULK_CREATE_LIMITS: BatchLimits = BatchLimits::new(1000, 2_000_000);

/// Bulk DELETE: IDs travel in the `filter` query parameter, so the
/// encoded length bounds the batch before the count does
pub const BULK_DELETE_LIMITS: BatchLimits = BatchLimits::new(200, 7000);

/// Split `items` into consecutive batches that respect `limits`.
///
/// `weight` returns the byte cost of one item. Order is preserved. An
/// item heavier than `max_bytes` is placed alone in its own batch rather
/// than dropped; the server gets the final word on it.
pub fn batches<T, F>(items: Vec<T>, limits: BatchLimits, weight: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> usize,
{
    let max_items = limits.max_items.max(1);
    let mut result = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_bytes = 0usize;

    for item in items {
        let cost = weight(&item);
        let over_count = current.len() >= max_items;
        let over_bytes = current_bytes.saturating_add(cost) > limits.max_bytes;

        if !current.is_empty() && (over_count || over_bytes) {
            result.push(std::mem::take(&mut current));
            current_bytes = 0;
        }

        current_bytes = current_bytes.saturating_add(cost);
        current.push(item);
    }

    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// Byte cost of a JSON value as it will be sent, plus the separating comma
pub fn json_weight(value: &serde_json::Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0) + 1
}

/// Prefix of the bulk delete filter, `filter=ids:a,b,c`
pub const ID_FILTER_PREFIX: &str = "ids:";

/// Byte cost of an ID inside the URL-encoded filter
pub fn id_weight(id: &str) -> usize {
    // comma is encoded as %2C
    urlencoding::encode(id).len() + 3
}

/// Split IDs into bulk delete batches. Each batch pays for the encoded
/// `ids:` prefix once, on top of its IDs.
pub fn id_batches<T, F>(items: Vec<T>, limits: BatchLimits, id: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> &str,
{
    let prefix = urlencoding::encode(ID_FILTER_PREFIX).len();
    let limits = BatchLimits::new(limits.max_items, limits.max_bytes.saturating_sub(prefix));
    batches(items, limits, |item| id_weight(id(item)))
}
