mod backfill_idempotence;
mod circuit_breaker;
mod collision_group;
mod cross_org_isolation;
mod duplicate_delivery;
mod invalid_cursor;
mod marker_stitch;
mod routing_rules;
mod spam_routing;
mod suite;
