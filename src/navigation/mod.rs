//! Navigation state machine.
//!
//! # Data Flow
//! ```text
//! navigate / submit / go / revalidate
//!     → router.rs: new navigation id, abort the previous one
//!     → routing: match the target location
//!        └─ no match → commit 404 at the root boundary
//!     → mutation? navigation = Submitting, run the target action
//!        ├─ redirect → start a replacing navigation
//!        └─ error → boundary.rs picks the boundary, load routes above it
//!     → navigation = Loading
//!     → revalidation.rs: which loaders run
//!     → loaders run concurrently (data.rs types)
//!        └─ redirect → start a navigation to the target
//!     → still the latest navigation? commit state.rs snapshot, notify
//! ```
//!
//! # Design Decisions
//! - The latest intent always wins: older navigations finish silently
//! - Errors are data: they land in `errors` keyed by a boundary route,
//!   never as an `Err` of `navigate`
//! - Deferred loader values commit immediately; their pending entries
//!   settle afterwards through the container itself

pub mod boundary;
pub mod data;
pub mod error;
pub mod revalidation;
pub mod router;
pub mod state;

pub use boundary::{find_nearest_boundary, Boundary, NOT_FOUND_ROUTE_ID};
pub use data::{
    action_fn, defer, json, loader_fn, redirect, should_revalidate_fn, ActionFn,
    DataFunctionArgs, DataRequest, DataResponse, LoaderFn, ShouldRevalidateArgs,
    ShouldRevalidateFn, Submission,
};
pub use error::{ErrorResponse, Redirect, RouteError, RouterError, RouterResult};
pub use router::{FetcherHandle, NavigateOptions, Router, RouterOptions, DEFAULT_MAX_REDIRECTS};
pub use state::{
    DataMatch, HydrationState, LoaderValue, Navigation, NavigationOutcome, RevalidationState,
    RouterState, TransitionStatus,
};
