pub mod basket;
pub mod payment;
pub mod tenant;
pub mod voucher;

pub use basket::{
    AppliedDiscount, Basket, BasketDetail, BasketItem, BasketItemChange, BasketStatus, Bundle,
    ItemKind,
};
pub use payment::{Payment, PaymentAttempt, PaymentStatus};
pub use tenant::Tenant;
pub use voucher::{Voucher, VoucherStatus};
