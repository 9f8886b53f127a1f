use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use swiftsell_provider::{ImageBlob, ListingClient};
use swiftsell_schema::{GroundingChunk, ItemData, PlatformId};

const DEFAULT_LISTING_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Idle,
    Review,
    Listing,
    Complete,
}

/// Everything the presentation layer needs to render one frame of the
/// workflow. Cloned out on every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub state: WorkflowState,
    pub item: Option<ItemData>,
    pub sources: Vec<GroundingChunk>,
    pub listed_platforms: BTreeSet<PlatformId>,
    pub error: Option<String>,
    pub is_loading: bool,
}

struct Inner {
    snapshot: Snapshot,
    /// Token of the in-flight analyze/list call. A response that resolves
    /// after `reset` no longer matches and is discarded instead of
    /// overwriting fresh state.
    in_flight: Option<Uuid>,
}

/// Strictly linear capture → analyze → review → list workflow with a
/// reset edge from any state. Owns all transient UI state; errors are
/// converted to one human-readable slot and never retried.
pub struct Workflow {
    client: Arc<dyn ListingClient>,
    inner: Mutex<Inner>,
    listing_delay: Duration,
}

impl Workflow {
    pub fn new(client: Arc<dyn ListingClient>) -> Self {
        Self {
            client,
            inner: Mutex::new(Inner {
                snapshot: Snapshot::default(),
                in_flight: None,
            }),
            listing_delay: DEFAULT_LISTING_DELAY,
        }
    }

    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.snapshot.clone()
    }

    /// Idle → Review on success; back to Idle with a recorded error on
    /// failure. At most one analyze/list is in flight at a time; a second
    /// request while loading is ignored.
    pub async fn analyze(&self, images: &[ImageBlob]) -> Snapshot {
        let token = Uuid::new_v4();
        {
            let mut inner = self.inner.lock().await;
            if inner.snapshot.is_loading {
                tracing::warn!("analyze requested while another operation is in flight, ignoring");
                return inner.snapshot.clone();
            }
            inner.snapshot.is_loading = true;
            inner.snapshot.error = None;
            inner.in_flight = Some(token);
        }

        let result = self.client.analyze_images(images).await;

        let mut inner = self.inner.lock().await;
        if inner.in_flight != Some(token) {
            tracing::debug!("discarding stale analysis response");
            return inner.snapshot.clone();
        }
        inner.in_flight = None;
        inner.snapshot.is_loading = false;
        match result {
            Ok(analysis) => {
                inner.snapshot.item = Some(analysis.item);
                inner.snapshot.sources = analysis.sources;
                inner.snapshot.state = WorkflowState::Review;
            }
            Err(err) => {
                tracing::error!(error = %err, "image analysis failed");
                inner.snapshot.error = Some(format!("Failed to analyze images. {err}"));
                inner.snapshot.state = WorkflowState::Idle;
            }
        }
        inner.snapshot.clone()
    }

    /// Review → Listing, replacing the generated draft with the user's
    /// edited version verbatim.
    pub async fn approve(&self, edited: ItemData) -> Snapshot {
        let mut inner = self.inner.lock().await;
        if inner.snapshot.state != WorkflowState::Review {
            tracing::warn!(state = ?inner.snapshot.state, "approve outside review, ignoring");
            return inner.snapshot.clone();
        }
        inner.snapshot.item = Some(edited);
        inner.snapshot.state = WorkflowState::Listing;
        inner.snapshot.clone()
    }

    /// Listing → Complete after the simulated submission delay, recording
    /// which platforms were listed to. The delay stands in for a real
    /// marketplace submission integration.
    pub async fn list(&self, platforms: BTreeSet<PlatformId>) -> Snapshot {
        let token = Uuid::new_v4();
        {
            let mut inner = self.inner.lock().await;
            if inner.snapshot.state != WorkflowState::Listing {
                tracing::warn!(state = ?inner.snapshot.state, "list outside listing, ignoring");
                return inner.snapshot.clone();
            }
            if inner.snapshot.is_loading {
                tracing::warn!("list requested while another operation is in flight, ignoring");
                return inner.snapshot.clone();
            }
            if platforms.is_empty() {
                tracing::warn!("list requested with no platforms selected, ignoring");
                return inner.snapshot.clone();
            }
            inner.snapshot.is_loading = true;
            inner.snapshot.error = None;
            inner.snapshot.listed_platforms = platforms;
            inner.in_flight = Some(token);
        }

        tokio::time::sleep(self.listing_delay).await;

        let mut inner = self.inner.lock().await;
        if inner.in_flight != Some(token) {
            tracing::debug!("discarding stale listing completion");
            return inner.snapshot.clone();
        }
        inner.in_flight = None;
        inner.snapshot.is_loading = false;
        inner.snapshot.state = WorkflowState::Complete;
        inner.snapshot.clone()
    }

    /// Unconditional return to a pristine Idle snapshot, discarding
    /// unsaved edits and invalidating any in-flight request.
    pub async fn reset(&self) -> Snapshot {
        let mut inner = self.inner.lock().await;
        inner.in_flight = None;
        inner.snapshot = Snapshot::default();
        inner.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use swiftsell_provider::{Analysis, ItemCopy, PriceEstimate, StubListingClient};
    use swiftsell_schema::Error;

    fn one_image() -> Vec<ImageBlob> {
        vec![ImageBlob::new(vec![1, 2, 3], "image/jpeg")]
    }

    fn platforms(ids: &[PlatformId]) -> BTreeSet<PlatformId> {
        ids.iter().copied().collect()
    }

    fn workflow() -> Workflow {
        Workflow::new(Arc::new(StubListingClient)).with_listing_delay(Duration::ZERO)
    }

    struct FailingClient;

    #[async_trait]
    impl ListingClient for FailingClient {
        async fn describe(&self, _images: &[ImageBlob]) -> Result<ItemCopy, Error> {
            let source = serde_err();
            Err(Error::MalformedResponse(source))
        }

        async fn estimate_price(&self, _images: &[ImageBlob]) -> Result<PriceEstimate, Error> {
            Ok(PriceEstimate {
                price: 0.0,
                sources: vec![],
            })
        }
    }

    fn serde_err() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("not json").unwrap_err()
    }

    /// Wraps another client, counting calls and delaying responses so a
    /// reset can land mid-flight.
    struct SlowClient {
        inner: StubListingClient,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowClient {
        fn new(delay: Duration) -> Self {
            Self {
                inner: StubListingClient,
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ListingClient for SlowClient {
        async fn describe(&self, images: &[ImageBlob]) -> Result<ItemCopy, Error> {
            self.inner.describe(images).await
        }

        async fn estimate_price(&self, images: &[ImageBlob]) -> Result<PriceEstimate, Error> {
            self.inner.estimate_price(images).await
        }

        async fn analyze_images(&self, images: &[ImageBlob]) -> Result<Analysis, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.analyze_images(images).await
        }
    }

    #[tokio::test]
    async fn full_workflow_reaches_complete() {
        let workflow = workflow();

        let snapshot = workflow.analyze(&one_image()).await;
        assert_eq!(snapshot.state, WorkflowState::Review);
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.is_none());
        assert_eq!(
            snapshot.item.as_ref().unwrap().title,
            "Premium Quality Item - Great Condition"
        );
        assert_eq!(snapshot.sources.len(), 2);

        let edited = ItemData {
            title: "Lightly used camera".into(),
            description: "One owner.".into(),
            price: 99.5,
        };
        let snapshot = workflow.approve(edited.clone()).await;
        assert_eq!(snapshot.state, WorkflowState::Listing);
        assert_eq!(snapshot.item, Some(edited));

        let snapshot = workflow
            .list(platforms(&[PlatformId::Shopify, PlatformId::Ebay]))
            .await;
        assert_eq!(snapshot.state, WorkflowState::Complete);
        assert_eq!(
            snapshot.listed_platforms,
            platforms(&[PlatformId::Shopify, PlatformId::Ebay])
        );
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn analyze_empty_images_records_error_and_stays_idle() {
        let workflow = workflow();
        let snapshot = workflow.analyze(&[]).await;
        assert_eq!(snapshot.state, WorkflowState::Idle);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Failed to analyze images. no images provided for analysis")
        );
        assert!(snapshot.item.is_none());
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn malformed_description_returns_to_idle_with_error() {
        let workflow =
            Workflow::new(Arc::new(FailingClient)).with_listing_delay(Duration::ZERO);
        let snapshot = workflow.analyze(&one_image()).await;
        assert_eq!(snapshot.state, WorkflowState::Idle);
        let error = snapshot.error.unwrap();
        assert!(error.starts_with("Failed to analyze images."));
        assert!(error.contains("invalid format"));
    }

    #[tokio::test]
    async fn new_analyze_clears_previous_error() {
        let failing = Workflow::new(Arc::new(FailingClient));
        let snapshot = failing.analyze(&one_image()).await;
        assert!(snapshot.error.is_some());

        let workflow = workflow();
        workflow.analyze(&[]).await;
        let snapshot = workflow.analyze(&one_image()).await;
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.state, WorkflowState::Review);
    }

    #[tokio::test]
    async fn reset_restores_pristine_idle_from_any_state() {
        let workflow = workflow();

        workflow.analyze(&one_image()).await;
        assert_eq!(workflow.reset().await, Snapshot::default());

        workflow.analyze(&one_image()).await;
        workflow
            .approve(ItemData {
                title: "t".into(),
                description: "d".into(),
                price: 1.0,
            })
            .await;
        workflow.list(platforms(&[PlatformId::Ebay])).await;
        let snapshot = workflow.reset().await;
        assert_eq!(snapshot.state, WorkflowState::Idle);
        assert!(snapshot.item.is_none());
        assert!(snapshot.sources.is_empty());
        assert!(snapshot.listed_platforms.is_empty());
        assert!(snapshot.error.is_none());
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn stale_analysis_after_reset_is_discarded() {
        let workflow = Arc::new(
            Workflow::new(Arc::new(SlowClient::new(Duration::from_millis(50))))
                .with_listing_delay(Duration::ZERO),
        );

        let task = {
            let workflow = workflow.clone();
            tokio::spawn(async move { workflow.analyze(&one_image()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        workflow.reset().await;
        let snapshot = task.await.unwrap();

        // The late response must not resurrect the pre-reset flow.
        assert_eq!(snapshot.state, WorkflowState::Idle);
        assert!(snapshot.item.is_none());
        assert_eq!(workflow.snapshot().await, Snapshot::default());
    }

    #[tokio::test]
    async fn second_analyze_while_loading_is_ignored() {
        let client = Arc::new(SlowClient::new(Duration::from_millis(50)));
        let workflow = Arc::new(Workflow::new(client.clone()));

        let task = {
            let workflow = workflow.clone();
            tokio::spawn(async move { workflow.analyze(&one_image()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = workflow.analyze(&one_image()).await;
        assert!(snapshot.is_loading);

        task.await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn approve_outside_review_is_ignored() {
        let workflow = workflow();
        let snapshot = workflow
            .approve(ItemData {
                title: "t".into(),
                description: "d".into(),
                price: 0.0,
            })
            .await;
        assert_eq!(snapshot.state, WorkflowState::Idle);
        assert!(snapshot.item.is_none());
    }

    #[tokio::test]
    async fn list_requires_listing_state_and_platforms() {
        let workflow = workflow();
        let snapshot = workflow.list(platforms(&[PlatformId::Ebay])).await;
        assert_eq!(snapshot.state, WorkflowState::Idle);

        workflow.analyze(&one_image()).await;
        workflow
            .approve(ItemData {
                title: "t".into(),
                description: "d".into(),
                price: 5.0,
            })
            .await;
        let snapshot = workflow.list(BTreeSet::new()).await;
        assert_eq!(snapshot.state, WorkflowState::Listing);
        assert!(snapshot.listed_platforms.is_empty());
    }
}
