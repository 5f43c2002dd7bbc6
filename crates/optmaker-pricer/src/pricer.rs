//! Pricer trait and the shared RFQ decision logic.

use crate::registry::OptionRegistry;
use crate::rfq::{DeclineReason, QuoteFill, QuoteSide, RfqDecision, RfqLeg, RfqRequest};
use optmaker_core::{option_amount_for_quote, quote_amount_for, Address, OptionContract, QuoteResult, Rounding, U256};
use tracing::debug;

/// Live quoting function over a registry of options.
///
/// Implementations supply `price`; amounts and RFQ decisions are shared.
/// Nothing here returns an error: a missing price is `None`, a request
/// that cannot be served is a `DeclineReason`.
pub trait Pricer: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    fn registry(&self) -> &OptionRegistry;

    /// Register an option. Returns `false` if it was already registered.
    fn register_option(&self, option: OptionContract) -> bool;

    /// Whether the option has a configured price source. Says nothing about
    /// whether a fresh price exists right now.
    fn has_price_source(&self, option: &OptionContract) -> bool;

    /// Two-sided quote per option token, or `None` if no fresh price.
    fn price(&self, address: &Address) -> Option<QuoteResult>;

    fn is_option(&self, address: &Address) -> bool {
        self.registry().contains(address)
    }

    /// Registered options with a price source.
    fn quotable_count(&self) -> usize {
        self.registry()
            .all()
            .iter()
            .filter(|o| self.has_price_source(o))
            .count()
    }

    /// Quote-token amount the maker asks for `token_amount` option tokens.
    /// Rounded up.
    fn get_ask_quote(&self, address: &Address, token_amount: U256, quote_decimals: u8) -> Option<U256> {
        let option = self.registry().get(address)?;
        let ask = self.price(address)?.ask;
        if ask <= 0.0 {
            return None;
        }
        quote_amount_for(token_amount, ask, quote_decimals, option.decimals, Rounding::Up)
    }

    /// Quote-token amount the maker bids for `token_amount` option tokens.
    /// Rounded down.
    fn get_bid_quote(&self, address: &Address, token_amount: U256, quote_decimals: u8) -> Option<U256> {
        let option = self.registry().get(address)?;
        let bid = self.price(address)?.bid;
        if bid <= 0.0 {
            return None;
        }
        quote_amount_for(token_amount, bid, quote_decimals, option.decimals, Rounding::Down)
    }

    /// Quote or decline an RFQ. Exactly one leg must be a registered option.
    fn handle_rfq(&self, request: &RfqRequest) -> RfqDecision {
        let decision = decide(self, request);
        if let RfqDecision::Decline(reason) = &decision {
            debug!(
                pricer = self.name(),
                quote_id = %request.quote_id,
                reason = reason.as_str(),
                "RFQ declined"
            );
        }
        decision
    }
}

fn decide<P: Pricer + ?Sized>(pricer: &P, request: &RfqRequest) -> RfqDecision {
    let (side, option_leg, quote_leg) = match (
        pricer.is_option(&request.sell.token),
        pricer.is_option(&request.buy.token),
    ) {
        (true, true) => return RfqDecision::Decline(DeclineReason::BothLegsOptions),
        (false, false) => return RfqDecision::Decline(DeclineReason::NoOptionLeg),
        (false, true) => (QuoteSide::Ask, &request.buy, &request.sell),
        (true, false) => (QuoteSide::Bid, &request.sell, &request.buy),
    };

    let Some(option) = pricer.registry().get(&option_leg.token) else {
        return RfqDecision::Decline(DeclineReason::NoOptionLeg);
    };
    let Some(quote) = pricer.price(&option.address) else {
        return RfqDecision::Decline(DeclineReason::NoPrice);
    };
    let price = match side {
        QuoteSide::Bid => quote.bid,
        QuoteSide::Ask => quote.ask,
    };
    if !price.is_finite() || price <= 0.0 {
        return RfqDecision::Decline(DeclineReason::NoPrice);
    }

    match resolve_amounts(side, price, option_leg, quote_leg, option.decimals) {
        Ok((option_amount, quote_amount)) => RfqDecision::Quote(QuoteFill {
            side,
            option: option.address,
            option_amount,
            quote_token: quote_leg.token,
            quote_amount,
            price,
        }),
        Err(reason) => RfqDecision::Decline(reason),
    }
}

/// Fill whichever amount the taker left open. The option amount takes
/// precedence when both are given.
///
/// Derived amounts round in the maker's favour: on the ask the maker
/// receives quote tokens (up) and delivers options (down), on the bid the
/// maker pays quote tokens (down) and receives options (up).
fn resolve_amounts(
    side: QuoteSide,
    price: f64,
    option_leg: &RfqLeg,
    quote_leg: &RfqLeg,
    option_decimals: u8,
) -> Result<(U256, U256), DeclineReason> {
    let (quote_rounding, option_rounding) = match side {
        QuoteSide::Ask => (Rounding::Up, Rounding::Down),
        QuoteSide::Bid => (Rounding::Down, Rounding::Up),
    };
    let (option_amount, quote_amount) =
        match (option_leg.nonzero_amount(), quote_leg.nonzero_amount()) {
            (Some(option_amount), _) => {
                let quote_amount =
                    quote_amount_for(option_amount, price, quote_leg.decimals, option_decimals, quote_rounding)
                        .ok_or(DeclineReason::AmountOverflow)?;
                (option_amount, quote_amount)
            }
            (None, Some(quote_amount)) => {
                let option_amount =
                    option_amount_for_quote(quote_amount, price, quote_leg.decimals, option_decimals, option_rounding)
                        .ok_or(DeclineReason::AmountOverflow)?;
                (option_amount, quote_amount)
            }
            (None, None) => return Err(DeclineReason::ZeroAmount),
        };

    if option_amount.is_zero() || quote_amount.is_zero() {
        return Err(DeclineReason::ZeroAmount);
    }
    Ok((option_amount, quote_amount))
}
