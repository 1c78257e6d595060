//! Validated name labels.
//!
//! Names are chosen by operators or derived from credentials; they are
//! referenced by configuration and must stay stable across restarts, so
//! they are plain validated strings rather than generated ULIDs.

use crate::define_name;

define_name!(AccessKey, "access key");
define_name!(DomainName, "domain");
define_name!(ScalingGroup, "scaling group");
