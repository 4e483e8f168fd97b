// self
use crate::{_prelude::*, obs::Stage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span wrapper used by broker stages.
#[derive(Clone, Debug)]
pub struct BrokerSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl BrokerSpan {
	/// Creates a new span tagged with the stage and target principal.
	pub fn new(stage: Stage, principal: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("credential_broker.call", stage = stage.as_str(), principal);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, principal);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}
