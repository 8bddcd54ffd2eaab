/*!
The 64 bit flow cookie.

```text
 63        52 51                        24 23                     0
+------------+----------------------------+-----------------------+
|   app id   |         flowset id         |   routing decision    |
+------------+----------------------------+-----------------------+
```

The application id identifies the rules this controller module owns.
The user part is split into the descriptor of the routing decision that
allowed the flow, e.g. by a firewall, and the flowset that groups all rules
installed for one end-to-end connection. Both are used as deletion
predicates together with a cookie mask.
*/

pub const APP_ID_BITS: u32 = 12;
pub const APP_ID_SHIFT: u32 = 64 - APP_ID_BITS;
const APP_ID_MAX: u64 = (1 << APP_ID_BITS) - 1;
const USER_MASK: u64 = (1 << APP_ID_SHIFT) - 1;

pub const DECISION_BITS: u32 = 24;
pub const DECISION_SHIFT: u32 = 0;
pub const DECISION_MASK: u64 = ((1 << DECISION_BITS) - 1) << DECISION_SHIFT;

pub const FLOWSET_BITS: u32 = 28;
pub const FLOWSET_SHIFT: u32 = DECISION_BITS;
pub const FLOWSET_MASK: u64 = ((1 << FLOWSET_BITS) - 1) << FLOWSET_SHIFT;
/// The largest flowset counter value before the generator wraps
pub const FLOWSET_MAX: u64 = (1 << FLOWSET_BITS) - 1;

/// The application id of the forwarding module
pub const FORWARDING_APP_ID: u64 = 2;

/// The cookie of forwarding rules without any user fields
pub const DEFAULT_FORWARDING_COOKIE: u64 = FORWARDING_APP_ID << APP_ID_SHIFT;

/// Places `app` in the upper 12 bits and `user` in the lower 52 bits.
pub fn make_cookie(app: u64, user: u64) -> u64 {
    ((app & APP_ID_MAX) << APP_ID_SHIFT) | (user & USER_MASK)
}

pub fn extract_app(cookie: u64) -> u64 {
    cookie >> APP_ID_SHIFT
}

pub fn extract_user(cookie: u64) -> u64 {
    cookie & USER_MASK
}

/// The mask selecting the application id of a cookie
pub fn app_field_mask() -> u64 {
    APP_ID_MAX << APP_ID_SHIFT
}

/// A flowset id, kept in the shape of a cookie:
/// the counter value shifted into the flowset slot.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FlowsetId(u64);

impl FlowsetId {
    /// Wraps a counter value. Bits beyond the flowset width are discarded.
    pub fn from_counter(counter: u64) -> FlowsetId {
        FlowsetId((counter << FLOWSET_SHIFT) & FLOWSET_MASK)
    }

    /// Gets the counter value this id was minted from
    pub fn counter(&self) -> u64 {
        (self.0 & FLOWSET_MASK) >> FLOWSET_SHIFT
    }

    /// Gets the cookie shaped representation (app and decision slots zero)
    pub fn as_cookie(&self) -> u64 {
        self.0
    }
}

/// A value together with the mask of its significant bits.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Masked {
    pub value: u64,
    pub mask: u64,
}

impl Masked {
    pub fn new(value: u64, mask: u64) -> Masked {
        Masked { value, mask }
    }
}

/// Builds the cookie of a forwarding rule from the routing decision
/// descriptor and the flowset id, each masked into its own slot.
pub fn make_forwarding_cookie(descriptor: Option<u64>, flowset: Option<FlowsetId>) -> u64 {
    let mut user_fields = 0;
    if let Some(d) = descriptor {
        user_fields |= extract_user(d) & DECISION_MASK;
    }
    if let Some(f) = flowset {
        user_fields |= extract_user(f.as_cookie()) & FLOWSET_MASK;
    }
    if user_fields == 0 {
        return DEFAULT_FORWARDING_COOKIE;
    }
    make_cookie(FORWARDING_APP_ID, user_fields)
}

/// Converts masked routing decision descriptors into masked forwarding
/// cookies usable as flow deletion predicates.
pub fn convert_descriptors(descriptors: &[Masked]) -> Vec<Masked> {
    descriptors
        .iter()
        .map(|d| {
            let user_mask = extract_user(d.mask) & DECISION_MASK;
            let user_value = extract_user(d.value) & user_mask;
            Masked::new(
                make_cookie(FORWARDING_APP_ID, user_value),
                app_field_mask() | user_mask,
            )
        })
        .collect()
}

/// Gets the decision descriptor slot of a cookie
pub fn extract_decision(cookie: u64) -> u64 {
    cookie & DECISION_MASK
}

/// Gets the flowset slot of a cookie
pub fn extract_flowset(cookie: u64) -> FlowsetId {
    FlowsetId(cookie & FLOWSET_MASK)
}
