//! Option discovery.
//!
//! Discovery yields raw `OptionParams` (fixed-point strikes, puts
//! pre-inverted) exactly as the upstream contract read would. Turning them
//! into registered options is shared by every source.

use crate::config::OptionEntry;
use crate::error::AppResult;
use optmaker_core::{Clock, OptionContract, OptionParams};
use optmaker_pricer::Pricer;
use std::future::Future;
use tracing::{debug, info, warn};

/// Source of tradable options, queried at startup and on refresh.
pub trait OptionDiscovery: Send + Sync + 'static {
    fn discover(&self) -> impl Future<Output = AppResult<Vec<OptionParams>>> + Send;
}

/// Options listed in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    options: Vec<OptionParams>,
}

impl StaticDiscovery {
    pub fn new(options: Vec<OptionParams>) -> Self {
        Self { options }
    }

    pub fn from_entries(entries: &[OptionEntry]) -> AppResult<Self> {
        let options = entries
            .iter()
            .map(OptionEntry::to_params)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { options })
    }
}

impl OptionDiscovery for StaticDiscovery {
    async fn discover(&self) -> AppResult<Vec<OptionParams>> {
        Ok(self.options.clone())
    }
}

/// Outcome of one registration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub registered: usize,
    pub already_known: usize,
    pub expired: usize,
    pub invalid: usize,
}

/// Register every unexpired option. Existing registrations are untouched.
pub fn register_options(pricer: &dyn Pricer, options: &[OptionParams], clock: &dyn Clock) -> RegistrationSummary {
    let now = clock.now_secs();
    let mut summary = RegistrationSummary::default();
    for params in options {
        let option = match OptionContract::from_params(params) {
            Ok(option) => option,
            Err(e) => {
                warn!(address = %params.address, error = %e, "Skipping invalid option");
                summary.invalid += 1;
                continue;
            }
        };
        if option.is_expired(now) {
            debug!(address = %option.address, expiry = option.expiry, "Skipping expired option");
            summary.expired += 1;
            continue;
        }
        if pricer.register_option(option) {
            summary.registered += 1;
        } else {
            summary.already_known += 1;
        }
    }
    info!(
        pricer = pricer.name(),
        registered = summary.registered,
        already_known = summary.already_known,
        expired = summary.expired,
        invalid = summary.invalid,
        "Options registered"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use optmaker_core::{Address, ManualClock, OptionKind, QuoteResult, U256};
    use optmaker_pricer::OptionRegistry;

    struct RegistryOnly(OptionRegistry);

    impl Pricer for RegistryOnly {
        fn name(&self) -> &'static str {
            "registry"
        }
        fn registry(&self) -> &OptionRegistry {
            &self.0
        }
        fn register_option(&self, option: OptionContract) -> bool {
            self.0.register(option)
        }
        fn has_price_source(&self, _option: &OptionContract) -> bool {
            true
        }
        fn price(&self, _address: &Address) -> Option<QuoteResult> {
            None
        }
    }

    fn params(byte: u8, expiry: i64, strike: U256) -> OptionParams {
        OptionParams {
            address: Address::repeat_byte(byte),
            redemption: Address::ZERO,
            underlying: "eth".to_string(),
            strike,
            expiry,
            is_put: false,
            decimals: 18,
            collateral: Address::repeat_byte(0xcc),
        }
    }

    fn strike_3000() -> U256 {
        U256::from(3_000u64) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[tokio::test]
    async fn test_static_discovery_registers_once() {
        let discovery = StaticDiscovery::new(vec![
            params(1, 2_000_000_000, strike_3000()),
            params(2, 1_000, strike_3000()),
            params(3, 2_000_000_000, U256::ZERO),
        ]);
        let pricer = RegistryOnly(OptionRegistry::new());
        let clock = ManualClock::new(1_700_000_000_000);

        let found = discovery.discover().await.unwrap();
        let summary = register_options(&pricer, &found, &clock);
        assert_eq!(
            summary,
            RegistrationSummary {
                registered: 1,
                already_known: 0,
                expired: 1,
                invalid: 1,
            }
        );
        let option = pricer.registry().get(&Address::repeat_byte(1)).unwrap();
        assert_eq!(option.underlying, "ETH");
        assert_eq!(option.kind, OptionKind::Call);
        assert!((option.strike - 3000.0).abs() < 1e-9);

        // refresh leaves existing registrations alone
        let again = register_options(&pricer, &found, &clock);
        assert_eq!(again.registered, 0);
        assert_eq!(again.already_known, 1);
        assert_eq!(pricer.registry().len(), 1);
    }
}
