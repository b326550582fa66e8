//! Property tests across crates.

use futures::executor::block_on;
use proptest::prelude::*;
use strata_codec::{from_binary, to_binary, BinaryDecoder, BinaryEncoder};
use strata_schema::{Instance, Namespace, Sort};
use strata_storage::{ListSource, PagedSource, Pager};
use strata_testkit::generators::{collection_strategy, sorted_sources_strategy, value_strategy};

proptest! {
    #[test]
    fn any_value_survives_the_binary_codec(value in value_strategy()) {
        let bytes = to_binary(&value).unwrap();
        prop_assert_eq!(from_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn typed_collections_survive_the_binary_codec((typ, raw) in collection_strategy()) {
        let ns = Namespace::builder().build().unwrap();
        let value = typ.create(&ns, &raw, None, false).unwrap();
        let mut out = BinaryEncoder::new();
        typ.serialize(&ns, &value, &mut out).unwrap();
        let bytes = out.into_bytes();
        let mut input = BinaryDecoder::new(&bytes);
        prop_assert_eq!(typ.deserialize(&ns, &mut input).unwrap(), value);
        prop_assert!(input.is_empty());
    }

    #[test]
    fn pages_cover_every_item_once_in_order(
        sources in sorted_sources_strategy(5, 30),
        count in 1usize..17,
    ) {
        let sort = [Sort::asc("score")];
        let make = || -> Vec<Box<dyn PagedSource>> {
            sources
                .iter()
                .map(|items| Box::new(ListSource::new(items.clone())) as Box<dyn PagedSource>)
                .collect()
        };
        let mut seen: Vec<Instance> = Vec::new();
        let mut paging = None;
        loop {
            let page = block_on(Pager::sorted(&sort, make(), paging).page(count)).unwrap();
            prop_assert!(page.len() <= count);
            let (items, next) = page.into_parts();
            seen.extend(items);
            match next {
                Some(token) => paging = Some(token),
                None => break,
            }
        }

        let mut expected: Vec<Instance> = sources.into_iter().flatten().collect();
        expected.sort_by(|a, b| Sort::compare_all_maps(&sort, a, b).then_with(|| a.id().cmp(&b.id())));
        prop_assert_eq!(seen, expected);
    }
}
