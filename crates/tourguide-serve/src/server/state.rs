use std::sync::Arc;

use crate::builder::TourGuideService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<TourGuideService>,
}

impl AppState {
    pub fn new(service: TourGuideService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
