use super::compiler::FilterCompiler;
use super::error::FilterError;
use super::types::{FindOptions, PaginationArgs};

impl FilterCompiler {
    /// Translate pagination arguments into store query options.
    ///
    /// `limit`/`take` and `offset`/`skip` are alias pairs (the first named
    /// wins). The effective limit is always `min(requested or default, max)`
    /// so an unbounded request never reaches the store. A skip of zero is
    /// dropped entirely.
    pub fn find_options(&self, args: &PaginationArgs) -> Result<FindOptions, FilterError> {
        let requested = args.limit.or(args.take);
        if let Some(l) = requested {
            if l < 0 {
                return Err(FilterError::InvalidLimit(format!(
                    "limit must be non-negative, got {l}"
                )));
            }
        }
        let limit = match requested {
            None => self.settings.default_limit,
            Some(l) if l > self.settings.max_limit => {
                if self.settings.debug_logging {
                    tracing::warn!(
                        requested = l,
                        max = self.settings.max_limit,
                        "limit exceeds max, capping"
                    );
                }
                self.settings.max_limit
            }
            Some(l) => l,
        };

        let offset = args.offset.or(args.skip);
        if let Some(o) = offset {
            if o < 0 {
                return Err(FilterError::InvalidOffset(format!(
                    "offset must be non-negative, got {o}"
                )));
            }
        }
        let skip = offset.filter(|o| *o > 0);

        let sort = args
            .sort
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| (s.field.clone(), s.order.direction()))
            .collect();

        Ok(FindOptions { limit, skip, sort })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compiler::FilterSettings;
    use crate::filter::types::{SortArg, SortOrder};

    fn compiler() -> FilterCompiler {
        FilterCompiler::with_settings(FilterSettings {
            default_limit: 25,
            max_limit: 100,
            auto_detect_ids: false,
            debug_logging: false,
        })
    }

    #[test]
    fn missing_limit_falls_back_to_default() {
        let opts = compiler().find_options(&PaginationArgs::default()).unwrap();
        assert_eq!(opts.limit, 25);
        assert_eq!(opts.skip, None);
        assert!(opts.sort.is_empty());
    }

    #[test]
    fn limit_is_clamped_to_max() {
        let args = PaginationArgs {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(compiler().find_options(&args).unwrap().limit, 100);
    }

    #[test]
    fn take_is_an_alias_for_limit() {
        let args = PaginationArgs {
            take: Some(7),
            ..Default::default()
        };
        assert_eq!(compiler().find_options(&args).unwrap().limit, 7);
    }

    #[test]
    fn zero_skip_is_never_emitted() {
        let args = PaginationArgs {
            skip: Some(0),
            ..Default::default()
        };
        assert_eq!(compiler().find_options(&args).unwrap().skip, None);

        let args = PaginationArgs {
            offset: Some(5),
            ..Default::default()
        };
        assert_eq!(compiler().find_options(&args).unwrap().skip, Some(5));
    }

    #[test]
    fn negative_limit_and_offset_are_rejected() {
        let args = PaginationArgs {
            limit: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            compiler().find_options(&args),
            Err(FilterError::InvalidLimit(_))
        ));

        let args = PaginationArgs {
            skip: Some(-3),
            ..Default::default()
        };
        assert!(matches!(
            compiler().find_options(&args),
            Err(FilterError::InvalidOffset(_))
        ));
    }

    #[test]
    fn sort_order_is_preserved() {
        let args = PaginationArgs {
            sort: Some(vec![
                SortArg {
                    field: "createdAt".to_string(),
                    order: SortOrder::Desc,
                },
                SortArg {
                    field: "name".to_string(),
                    order: SortOrder::Asc,
                },
            ]),
            ..Default::default()
        };
        let opts = compiler().find_options(&args).unwrap();
        assert_eq!(
            opts.sort,
            vec![("createdAt".to_string(), -1), ("name".to_string(), 1)]
        );
    }
}
