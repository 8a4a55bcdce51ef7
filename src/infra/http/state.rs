use crate::application::catalog::CatalogService;
use crate::application::plans::PlansService;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct HttpState {
    pub plans: PlansService,
    pub catalog: CatalogService,
}
