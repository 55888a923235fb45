pub mod baskets;
pub mod checkout;
pub mod payments;
pub mod tenants;
pub mod vouchers;
