//! Lazily populated discovery cache owned by each client.

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	error::{ConfigError, DiscoveryError},
	http::{ProviderEndpoint, ProviderHttpClient},
	oauth::{ProviderFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderMetadata,
};

/// Memoizes the provider metadata for the lifetime of the owning client.
///
/// The first successful fetch wins; concurrent callers racing on an empty cache may each
/// fetch, and the later results are dropped in favor of the stored value.
#[derive(Debug, Default)]
pub struct DiscoveryCache(RwLock<Option<Arc<ProviderMetadata>>>);
impl DiscoveryCache {
	/// Returns the cached metadata without fetching.
	pub fn cached(&self) -> Option<Arc<ProviderMetadata>> {
		self.0.read().clone()
	}

	/// Seeds the cache, e.g. with metadata loaded from static configuration.
	pub fn prime(&self, metadata: ProviderMetadata) -> Arc<ProviderMetadata> {
		self.0.write().get_or_insert_with(|| Arc::new(metadata)).clone()
	}

	/// Returns the cached metadata or fetches it.
	pub(crate) async fn metadata<C, M>(
		&self,
		facade: &ProviderFacade<'_, C, M>,
		config: &ClientConfig,
	) -> Result<Arc<ProviderMetadata>>
	where
		C: ?Sized + ProviderHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		if let Some(metadata) = self.cached() {
			return Ok(metadata);
		}

		let span = FlowSpan::new(FlowKind::Discovery, "fetch");

		obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

		let fetched =
			obs::observe(FlowKind::Discovery, span.instrument(fetch(facade, config)).await)?;

		Ok(self.prime(fetched))
	}
}

async fn fetch<C, M>(
	facade: &ProviderFacade<'_, C, M>,
	config: &ClientConfig,
) -> Result<ProviderMetadata>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let url = config.discovery_url().map_err(ConfigError::from)?;
	let response =
		facade.get(ProviderEndpoint::Discovery, &url, None).await.map_err(|e| match e {
			Error::Transport(source) => DiscoveryError::Unreachable { source }.into(),
			other => other,
		})?;

	if !response.is_success() {
		return Err(DiscoveryError::HttpStatus { status: response.status }.into());
	}

	Ok(ProviderMetadata::from_document(&response.body, &config.issuer)?)
}
