//! # W3C Trace Context propagator

use crate::propagation::{Extractor, Injector};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACE_CONTEXT_HEADER_FIELDS: [&str; 1] = [TRACEPARENT_HEADER];

/// Propagates a [`SpanContext`] in [W3C TraceContext] format under the
/// `traceparent` header.
///
/// The header carries four `-`-separated fields (version, trace-id,
/// parent-id and trace-flags), for example:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// Extraction is strict: a missing header or any format violation yields
/// `None` rather than an error, so a malformed inbound value degrades to
/// "no parent" and the receiving service starts a new root trace.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

/// A field is exactly `len` lowercase hex digits. `from_str_radix` alone
/// is too lenient here: it tolerates a leading `+` sign.
fn is_lowercase_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value
            .chars()
            .all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from the carrier's `traceparent` header.
    ///
    /// Returns `None` for an absent header and for every malformed value:
    /// wrong part count, bad lengths, non-hex or uppercase digits, an
    /// unknown version byte, invalid flags, or all-zero ids. Extraction
    /// never mutates the carrier, so repeated extraction from the same
    /// carrier yields the same result.
    pub fn extract(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header_value = extractor.get(TRACEPARENT_HEADER)?.trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return None;
        }

        // Version must be two lowercase hex characters below 0xff; for
        // version 0 there must be exactly 4 parts.
        if !is_lowercase_hex(parts[0], 2) {
            return None;
        }
        let version = u8::from_str_radix(parts[0], 16).ok()?;
        if version > MAX_VERSION || (version == 0 && parts.len() != 4) {
            return None;
        }

        // Trace id: exactly 32 lowercase hex characters.
        if !is_lowercase_hex(parts[1], 32) {
            return None;
        }
        let trace_id = TraceId::from_hex(parts[1]).ok()?;

        // Span id: exactly 16 lowercase hex characters.
        if !is_lowercase_hex(parts[2], 16) {
            return None;
        }
        let span_id = SpanId::from_hex(parts[2]).ok()?;

        // Flags: two lowercase hex characters; version 0 defines only the
        // low bits.
        if !is_lowercase_hex(parts[3], 2) {
            return None;
        }
        let opts = u8::from_str_radix(parts[3], 16).ok()?;
        if version == 0 && opts > 2 {
            return None;
        }
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let span_context = SpanContext::new(trace_id, span_id, trace_flags);
        span_context.is_valid().then_some(span_context)
    }

    /// Encode the given span context into the carrier.
    ///
    /// Callers must pass the context of the *currently open* span, not the
    /// one originally extracted, so nested and forwarded calls advance the
    /// parent pointer. Invalid contexts are not injected.
    pub fn inject(&self, span_context: &SpanContext, injector: &mut dyn Injector) {
        if span_context.is_valid() {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
        }
    }

    /// The header fields this propagator reads and writes.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> {
        TRACE_CONTEXT_HEADER_FIELDS.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[rustfmt::skip]
    fn extract_data() -> Vec<(&'static str, SpanContext)> {
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::default())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::SAMPLED)),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-08", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::default())),
            ("02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-XYZxsf09", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::SAMPLED)),
            ("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-09-", SpanContext::new(TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128), SpanId::from(0x00f0_67aa_0ba9_02b7u64), TraceFlags::SAMPLED)),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "wrong trace ID length"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "wrong span ID length"),
            ("00-ab000000000000000000000000000000-cd00000000000000-0100", "wrong trace flag length"),
            ("qw-00000000000000000000000000000000-0000000000000000-01",   "bogus version"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01",   "bogus trace ID"),
            ("00-ab000000000000000000000000000000-qw00000000000000-01",   "bogus span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw",   "bogus trace flag"),
            ("+0-ab000000000000000000000000000000-cd00000000000000-01",   "plus-signed version"),
            ("00-+b000000000000000000000000000001-cd00000000000000-01",   "plus-signed trace ID"),
            ("00-ab000000000000000000000000000000-+d00000000000000-01",   "plus-signed span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-+1",   "plus-signed trace flag"),
            ("A0-00000000000000000000000000000000-0000000000000000-01",   "upper case version"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01",   "upper case trace ID"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01",   "upper case span ID"),
            ("ff-ab000000000000000000000000000000-cd00000000000000-01",   "version too high"),
            ("00-00000000000000000000000000000000-0000000000000000-01",   "zero trace ID and span ID"),
            ("00-ab000000000000000000000000000000-0000000000000000-01",   "zero span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-09",   "trace-flag unused bits set"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",      "missing options"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-",     "empty options"),
            ("",                                                          "empty header"),
            ("00",                                                        "only version"),
            ("00--00",                                                    "missing ids"),
        ]
    }

    #[test]
    fn extract_w3c() {
        let propagator = TraceContextPropagator::new();

        for (trace_parent, expected_context) in extract_data() {
            let mut carrier = HashMap::new();
            carrier.insert(TRACEPARENT_HEADER.to_string(), trace_parent.to_string());

            assert_eq!(
                propagator.extract(&carrier),
                Some(expected_context),
                "{trace_parent}"
            )
        }
    }

    #[test]
    fn extract_w3c_reject_invalid() {
        let propagator = TraceContextPropagator::new();

        for (invalid_header, reason) in extract_data_invalid() {
            let mut carrier = HashMap::new();
            carrier.insert(TRACEPARENT_HEADER.to_string(), invalid_header.to_string());

            assert_eq!(propagator.extract(&carrier), None, "{reason}")
        }
    }

    #[test]
    fn extract_from_empty_carrier_yields_none() {
        let propagator = TraceContextPropagator::new();
        let carrier: HashMap<String, String> = HashMap::new();
        assert_eq!(propagator.extract(&carrier), None);
    }

    #[test]
    fn inject_w3c() {
        let propagator = TraceContextPropagator::new();
        let inject_data = vec![
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                SpanContext::new(
                    TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
                    SpanId::from(0x00f0_67aa_0ba9_02b7u64),
                    TraceFlags::SAMPLED,
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
                SpanContext::new(
                    TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
                    SpanId::from(0x00f0_67aa_0ba9_02b7u64),
                    TraceFlags::default(),
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                SpanContext::new(
                    TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
                    SpanId::from(0x00f0_67aa_0ba9_02b7u64),
                    TraceFlags::new(0xff),
                ),
            ),
        ];

        for (expected_header, context) in inject_data {
            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut carrier);

            assert_eq!(
                Extractor::get(&carrier, TRACEPARENT_HEADER).unwrap_or(""),
                expected_header
            );
        }
    }

    #[test]
    fn invalid_context_is_not_injected() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&SpanContext::NONE, &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn inject_extract_round_trip() {
        let propagator = TraceContextPropagator::new();
        let contexts = vec![
            SpanContext::new(TraceId::from(1u128), SpanId::from(1u64), TraceFlags::SAMPLED),
            SpanContext::new(
                TraceId::from(u128::MAX),
                SpanId::from(u64::MAX),
                TraceFlags::NOT_SAMPLED,
            ),
            SpanContext::new(
                TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
                SpanId::from(0x00f0_67aa_0ba9_02b7u64),
                TraceFlags::SAMPLED,
            ),
        ];

        for context in contexts {
            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut carrier);
            assert_eq!(propagator.extract(&carrier), Some(context));
        }
    }

    #[test]
    fn extraction_is_idempotent() {
        let propagator = TraceContextPropagator::new();
        let mut carrier = HashMap::new();
        carrier.insert(
            TRACEPARENT_HEADER.to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );

        let first = propagator.extract(&carrier);
        let second = propagator.extract(&carrier);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn fields_lists_the_traceparent_header() {
        let propagator = TraceContextPropagator::new();
        assert_eq!(propagator.fields().collect::<Vec<_>>(), vec!["traceparent"]);
    }
}
