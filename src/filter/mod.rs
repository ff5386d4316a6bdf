//! Filter engine: user-editable predicates over normalized packets.
//!
//! Expressions are compiled eagerly, so a bad filter is rejected before it
//! can be installed. A compiled [`FilterPredicate`] is immutable and
//! re-entrant; the active one lives in a [`FilterSlot`] and is replaced
//! wholesale.
//!
//! # Expression syntax
//!
//! ```text
//! from=N0CALL                     exact source callsign (case-insensitive)
//! call~K1                         substring of source or addressee
//! to=N0CALL-9                     message addressee, or frame destination
//! type=message,status             packet type set membership
//! text~"net tonight"              substring of the payload text
//! path~WIDE2                      any digipeater/q-construct hop
//! not (a or b) and c              boolean combination; && || ! also accepted
//! *                               everything (same as an empty expression)
//! ```
//!
//! Referencing an unknown field is a compile-time error:
//!
//! ```rust
//! use aprsfeed::{FeedError, filter};
//!
//! assert!(filter::compile("type=message and from~N0").is_ok());
//! assert!(matches!(
//!     filter::compile("freq=144.39"),
//!     Err(FeedError::FilterSyntax { position: 1, .. })
//! ));
//! ```

mod lexer;
mod parser;
mod predicate;
mod slot;

pub use predicate::FilterPredicate;
pub use slot::FilterSlot;

use crate::Result;
use crate::types::Packet;

/// Compile an expression into a predicate.
pub fn compile(expression: &str) -> Result<FilterPredicate> {
    let root = parser::parse(expression)?;
    Ok(FilterPredicate::new(expression, root))
}

/// Evaluate a predicate against a packet.
pub fn matches(predicate: &FilterPredicate, packet: &Packet) -> bool {
    predicate.matches(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::RawFrame;
    use proptest::prelude::*;
    use std::time::SystemTime;

    fn packet(text: &str) -> Packet {
        normalize(&RawFrame::new(text, SystemTime::UNIX_EPOCH, 1)).unwrap()
    }

    #[test]
    fn callsign_terms() {
        let p = packet("K1ABC-7>APRS,WIDE1-1,qAR,W1XYZ::N0CALL   :hello{1");

        assert!(compile("from=k1abc-7").unwrap().matches(&p));
        assert!(!compile("from=K1ABC").unwrap().matches(&p));
        assert!(compile("from~K1ABC").unwrap().matches(&p));
        assert!(compile("to=N0CALL").unwrap().matches(&p));
        assert!(compile("call=N0CALL").unwrap().matches(&p));
        assert!(compile("call=K1ABC-7").unwrap().matches(&p));
        assert!(!compile("call=W1XYZ").unwrap().matches(&p));
        assert!(compile("path=w1xyz").unwrap().matches(&p));
        assert!(compile("path~WIDE").unwrap().matches(&p));
    }

    #[test]
    fn type_and_text_terms() {
        let status = packet("N0CALL>APRS:>Net tonight at 8pm");
        let position = packet("N0CALL>APRS:!4903.50N/07201.75W-Portable");

        let net = compile("text~\"net tonight\"").unwrap();
        assert!(net.matches(&status));
        assert!(!net.matches(&position));

        let kinds = compile("type=position,telemetry").unwrap();
        assert!(kinds.matches(&position));
        assert!(!kinds.matches(&status));

        let combined = compile("not type=status and text~portable").unwrap();
        assert!(combined.matches(&position));
        assert!(!combined.matches(&status));
    }

    #[test]
    fn value_lists_are_disjunctions() {
        let p = packet("W1AW>APRS:>hi");
        assert!(compile("from=K1ABC,W1AW").unwrap().matches(&p));
        assert!(!compile("from=K1ABC,N0CALL").unwrap().matches(&p));
    }

    #[test]
    fn free_function_agrees_with_method() {
        let p = packet("W1AW>APRS:>hi");
        let predicate = compile("from=W1AW").unwrap();
        assert_eq!(matches(&predicate, &p), predicate.matches(&p));
    }

    proptest! {
        #[test]
        fn negation_inverts(source in "[A-Z]{1,2}[0-9][A-Z]{1,3}", needle in "[A-Z0-9]{1,3}") {
            let p = packet(&format!("{source}>APRS:>status"));
            let plain = compile(&format!("from~{needle}")).unwrap();
            let negated = compile(&format!("not from~{needle}")).unwrap();
            prop_assert_ne!(plain.matches(&p), negated.matches(&p));
        }

        #[test]
        fn compile_never_panics(expression in "\\PC{0,60}") {
            let _ = compile(&expression);
        }
    }
}
