use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

///
/// Kinds of basis quantities an element cache can hold.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind
{
    Value,
    Gradient,
    Hessian,
    Divergence,
}

impl ValueKind
{
    pub const ALL: [ValueKind; 4] = [ValueKind::Value, ValueKind::Gradient, ValueKind::Hessian, ValueKind::Divergence];
}

///
/// Requested (or filled) basis value kinds.
///
#[bitfield(u8)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct BasisFlags
{
    pub value: bool,
    pub gradient: bool,
    pub hessian: bool,
    pub divergence: bool,
    #[bits(4)]
    __: u8,
}

impl BasisFlags
{
    #[inline]
    pub fn contains_kind(&self, kind: ValueKind) -> bool
    {
        match kind
        {
            ValueKind::Value => self.value(),
            ValueKind::Gradient => self.gradient(),
            ValueKind::Hessian => self.hessian(),
            ValueKind::Divergence => self.divergence(),
        }
    }

    #[inline]
    pub fn with_kind(self, kind: ValueKind) -> Self
    {
        match kind
        {
            ValueKind::Value => self.with_value(true),
            ValueKind::Gradient => self.with_gradient(true),
            ValueKind::Hessian => self.with_hessian(true),
            ValueKind::Divergence => self.with_divergence(true),
        }
    }

    #[inline]
    pub fn union(self, other: Self) -> Self
    {
        Self::from_bits(self.into_bits() | other.into_bits())
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.into_bits() == 0
    }

    /// Highest derivative order needed to compute the requested kinds.
    pub fn max_derivative_order(&self) -> usize
    {
        if self.hessian()
        {
            2
        }
        else if self.gradient() || self.divergence()
        {
            1
        }
        else
        {
            0
        }
    }
}

///
/// Requested geometric quantities of a domain element.
///
#[bitfield(u8)]
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainFlags
{
    pub point: bool,
    pub jacobian: bool,
    pub hessian: bool,
    pub measure: bool,
    pub w_measure: bool,
    pub inv_jacobian: bool,
    pub ext_normal: bool,
    #[bits(1)]
    __: u8,
}

impl DomainFlags
{
    #[inline]
    pub fn union(self, other: Self) -> Self
    {
        Self::from_bits(self.into_bits() | other.into_bits())
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.into_bits() == 0
    }

    ///
    /// Adds the quantities the requested ones are computed from, e.g. the measure needs
    /// the Jacobian.
    ///
    pub fn with_dependencies(self) -> Self
    {
        let mut flags = self;
        if flags.w_measure()
        {
            flags.set_measure(true);
        }
        if flags.ext_normal()
        {
            flags.set_inv_jacobian(true);
        }
        if flags.measure() || flags.inv_jacobian() || flags.hessian()
        {
            flags.set_jacobian(true);
        }
        flags
    }
}

#[test]
fn check_basis_flags()
{
    let flags = BasisFlags::new().with_value(true).with_kind(ValueKind::Hessian);
    assert!(flags.contains_kind(ValueKind::Value));
    assert!(!flags.contains_kind(ValueKind::Gradient));
    assert_eq!(flags.max_derivative_order(), 2);
    assert!(BasisFlags::new().is_empty());
    assert_eq!(BasisFlags::new().with_gradient(true).union(flags).into_bits(), 0b0111);
}

#[test]
fn check_domain_flag_dependencies()
{
    let flags = DomainFlags::new().with_w_measure(true).with_dependencies();
    assert!(flags.measure() && flags.jacobian());
    assert!(!flags.inv_jacobian());
    let flags = DomainFlags::new().with_ext_normal(true).with_dependencies();
    assert!(flags.inv_jacobian() && flags.jacobian());
}
