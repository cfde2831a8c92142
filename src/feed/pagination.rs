use crate::api::CursorState;
use serde::Serialize;

/// UI-facing paging state derived purely from the cursor flags.
///
/// `estimated_total` is an ESTIMATE, never an exact count: the backend
/// deliberately computes no total row count, so the best the client can say
/// while more rows exist is "at least one more page". The estimate is
/// recomputed on every page load and grows monotonically as the reader pages
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageControls {
    pub page: u32,
    pub previous_enabled: bool,
    pub next_enabled: bool,
    pub estimated_total: u32,
}

impl PageControls {
    /// Derive paging controls for the given page from its cursor flags.
    pub fn estimate(page: u32, cursor: CursorState) -> Self {
        let page = page.max(1);

        let estimated_total = if cursor.has_next {
            page + 1 // At least one more page
        } else if page == 1 {
            1
        } else {
            page
        };

        Self {
            page,
            previous_enabled: cursor.has_previous && page > 1,
            next_enabled: cursor.has_next,
            estimated_total,
        }
    }
}

impl Default for PageControls {
    fn default() -> Self {
        Self::estimate(1, CursorState::default())
    }
}
