//! Queries over the objects of one entity type.
//!
//! A [`QueryBuilder`] collects conditions on properties. Each condition
//! method returns a [`Condition`] handle that [`QueryBuilder::all`] and
//! [`QueryBuilder::any`] combine; conditions left uncombined are joined
//! with AND. [`QueryBuilder::build`] produces a reusable [`Query`] whose
//! parameter values can be replaced without building it again.
//!
//! Null semantics: a property is null when its vtable slot is empty. For
//! scalars that is also the case when the stored value equals the default,
//! so value comparisons on scalars use the default for absent slots, while
//! string and bytes comparisons never match a null property.

use crate::config::DebugFlags;
use crate::error::{StoreError, StoreResult};
use crate::model::EntityType;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::types::EntityTypeId;
use bytes::Bytes;
use flatrec_codec::{FieldKind, ScalarType, ScalarValue, Table};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::ops::BitOr;
use tracing::debug;

/// Handle of a condition inside one [`QueryBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition(usize);

/// Sort options for [`QueryBuilder::order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OrderFlags(u32);

impl OrderFlags {
    /// Largest values first.
    pub const DESCENDING: Self = Self(1);
    /// Compare strings by exact case.
    pub const CASE_SENSITIVE: Self = Self(2);
    /// Compare signed integers as unsigned.
    pub const UNSIGNED: Self = Self(4);
    /// Put null values after all others instead of before.
    pub const NULLS_LAST: Self = Self(8);
    /// Treat null values as zero or empty.
    pub const NULLS_ZERO: Self = Self(16);

    /// No flags: ascending, case-insensitive, nulls first.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OrderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A condition parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// One string.
    String(String),
    /// A set of strings.
    Strings(Vec<String>),
    /// One integer.
    Int(i64),
    /// An inclusive integer range.
    IntRange(i64, i64),
    /// A set of integers.
    Ints(Vec<i64>),
    /// One float.
    Double(f64),
    /// An inclusive float range.
    DoubleRange(f64, f64),
    /// A byte string.
    Bytes(Vec<u8>),
}

impl QueryParam {
    fn kind_name(&self) -> &'static str {
        match self {
            QueryParam::String(_) => "string",
            QueryParam::Strings(_) => "string set",
            QueryParam::Int(_) => "int",
            QueryParam::IntRange(..) => "int range",
            QueryParam::Ints(_) => "int set",
            QueryParam::Double(_) => "double",
            QueryParam::DoubleRange(..) => "double range",
            QueryParam::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParam::String(value) => write!(f, "{value:?}"),
            QueryParam::Strings(values) => write!(f, "{values:?}"),
            QueryParam::Int(value) => write!(f, "{value}"),
            QueryParam::IntRange(low, high) => write!(f, "{low} and {high}"),
            QueryParam::Ints(values) => write!(f, "{values:?}"),
            QueryParam::Double(value) => write!(f, "{value}"),
            QueryParam::DoubleRange(low, high) => write!(f, "{low} and {high}"),
            QueryParam::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Which condition [`Query::set_param`] updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTarget<'a> {
    /// The only parameterized condition on this property.
    Property(u16),
    /// The condition given this alias with [`QueryBuilder::alias`].
    Alias(&'a str),
}

impl From<u16> for ParamTarget<'_> {
    fn from(property: u16) -> Self {
        ParamTarget::Property(property)
    }
}

impl<'a> From<&'a str> for ParamTarget<'a> {
    fn from(alias: &'a str) -> Self {
        ParamTarget::Alias(alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    IsNull,
    NotNull,
    StringEqual,
    StringNotEqual,
    StringContains,
    StringStartsWith,
    StringEndsWith,
    StringGreater,
    StringGreaterOrEqual,
    StringLess,
    StringLessOrEqual,
    StringIn,
    IntEqual,
    IntNotEqual,
    IntGreater,
    IntLess,
    IntBetween,
    IntIn,
    IntNotIn,
    DoubleGreater,
    DoubleLess,
    DoubleBetween,
    BytesEqual,
    BytesGreater,
    BytesGreaterOrEqual,
    BytesLess,
    BytesLessOrEqual,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::IsNull => "is null",
            Op::NotNull => "is not null",
            Op::StringEqual | Op::IntEqual | Op::BytesEqual => "==",
            Op::StringNotEqual | Op::IntNotEqual => "!=",
            Op::StringContains => "contains",
            Op::StringStartsWith => "starts with",
            Op::StringEndsWith => "ends with",
            Op::StringGreater | Op::IntGreater | Op::DoubleGreater | Op::BytesGreater => ">",
            Op::StringGreaterOrEqual | Op::BytesGreaterOrEqual => ">=",
            Op::StringLess | Op::IntLess | Op::DoubleLess | Op::BytesLess => "<",
            Op::StringLessOrEqual | Op::BytesLessOrEqual => "<=",
            Op::StringIn | Op::IntIn => "in",
            Op::IntNotIn => "not in",
            Op::IntBetween | Op::DoubleBetween => "between",
        }
    }

    fn is_string(self) -> bool {
        matches!(
            self,
            Op::StringEqual
                | Op::StringNotEqual
                | Op::StringContains
                | Op::StringStartsWith
                | Op::StringEndsWith
                | Op::StringGreater
                | Op::StringGreaterOrEqual
                | Op::StringLess
                | Op::StringLessOrEqual
                | Op::StringIn
        )
    }
}

#[derive(Debug, Clone)]
struct Leaf {
    property: u16,
    op: Op,
    param: Option<QueryParam>,
    case_sensitive: bool,
    alias: Option<String>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Leaf),
    All(Vec<usize>),
    Any(Vec<usize>),
}

#[derive(Debug, Clone, Copy)]
struct Order {
    property: u16,
    flags: OrderFlags,
}

/// What kind of property a condition needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Any,
    String,
    Integer,
    Float,
    Bytes,
}

impl Expect {
    fn accepts(self, kind: &FieldKind) -> bool {
        match (self, kind) {
            (Expect::Any, _) | (Expect::String, FieldKind::String) => true,
            (Expect::Integer, FieldKind::Scalar(ty)) => !ty.is_float(),
            (Expect::Float, FieldKind::Scalar(ty)) => ty.is_float(),
            (Expect::Bytes, FieldKind::Vector(ty)) => {
                matches!(ty, ScalarType::Int8 | ScalarType::UInt8)
            }
            _ => false,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Expect::Any => "any",
            Expect::String => "string",
            Expect::Integer => "integer",
            Expect::Float => "float",
            Expect::Bytes => "byte vector",
        }
    }
}

/// Collects conditions and sort orders for a [`Query`].
///
/// ```
/// use flatrec_codec::{FieldDef, ScalarType, TableSchema};
/// use flatrec_store::{Model, OrderFlags, Store};
///
/// static FIELDS: [FieldDef; 3] = [
///     FieldDef::scalar(0, "id", ScalarType::UInt64),
///     FieldDef::string(1, "name"),
///     FieldDef::scalar(2, "age", ScalarType::Int32),
/// ];
/// static PERSON: TableSchema = TableSchema::new("Person", &FIELDS);
///
/// let mut model = Model::new();
/// let person = model.add_entity(&PERSON, 0).unwrap();
/// let store = Store::open_in_memory(model).unwrap();
///
/// let mut qb = store.query(person).unwrap();
/// let adult = qb.int_greater(2, 17).unwrap();
/// let named = qb.string_starts_with(1, "A", false).unwrap();
/// qb.any(&[adult, named]).unwrap();
/// qb.order(1, OrderFlags::DESCENDING).unwrap();
/// let query = qb.build().unwrap();
/// assert!(query.describe_params().contains("age > 17"));
/// ```
#[derive(Debug)]
pub struct QueryBuilder {
    store: Store,
    entity: EntityTypeId,
    nodes: Vec<Node>,
    consumed: Vec<bool>,
    orders: Vec<Order>,
}

impl QueryBuilder {
    pub(crate) fn new(store: Store, entity: EntityTypeId) -> StoreResult<Self> {
        store.model().require_entity(entity)?;
        Ok(Self {
            store,
            entity,
            nodes: Vec::new(),
            consumed: Vec::new(),
            orders: Vec::new(),
        })
    }

    fn entity_type(&self) -> StoreResult<&EntityType> {
        self.store.model().require_entity(self.entity)
    }

    fn check_property(&self, property: u16, expect: Expect) -> StoreResult<()> {
        let entity = self.entity_type()?;
        let field = entity.schema().field(property).ok_or_else(|| {
            StoreError::illegal_argument(format!(
                "unknown property {}",
                entity.property_name(property)
            ))
        })?;
        if expect.accepts(&field.kind) {
            Ok(())
        } else {
            Err(StoreError::type_mismatch(
                entity.property_name(property),
                expect.describe(),
                field.kind.describe(),
            ))
        }
    }

    fn push(&mut self, node: Node) -> Condition {
        self.nodes.push(node);
        self.consumed.push(false);
        Condition(self.nodes.len() - 1)
    }

    fn leaf(
        &mut self,
        property: u16,
        expect: Expect,
        op: Op,
        param: Option<QueryParam>,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.check_property(property, expect)?;
        Ok(self.push(Node::Leaf(Leaf {
            property,
            op,
            param,
            case_sensitive,
            alias: None,
        })))
    }

    fn string_leaf(
        &mut self,
        property: u16,
        op: Op,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        let param = Some(QueryParam::String(value.to_string()));
        self.leaf(property, Expect::String, op, param, case_sensitive)
    }

    /// Matches objects whose property is null.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown property.
    pub fn null(&mut self, property: u16) -> StoreResult<Condition> {
        self.leaf(property, Expect::Any, Op::IsNull, None, false)
    }

    /// Matches objects whose property is not null.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown property.
    pub fn not_null(&mut self, property: u16) -> StoreResult<Condition> {
        self.leaf(property, Expect::Any, Op::NotNull, None, false)
    }

    /// String equality.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PropertyTypeMismatch`] unless the property is a
    /// string, or [`StoreError::IllegalArgument`] if it does not exist.
    pub fn string_equal(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.string_leaf(property, Op::StringEqual, value, case_sensitive)
    }

    /// String inequality. Null strings do not match.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_not_equal(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.string_leaf(property, Op::StringNotEqual, value, case_sensitive)
    }

    /// Substring match.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_contains(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.string_leaf(property, Op::StringContains, value, case_sensitive)
    }

    /// Prefix match.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_starts_with(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.string_leaf(property, Op::StringStartsWith, value, case_sensitive)
    }

    /// Suffix match.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_ends_with(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        self.string_leaf(property, Op::StringEndsWith, value, case_sensitive)
    }

    /// Lexicographic `>` (or `>=` with `with_equal`).
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_greater(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
        with_equal: bool,
    ) -> StoreResult<Condition> {
        let op = if with_equal {
            Op::StringGreaterOrEqual
        } else {
            Op::StringGreater
        };
        self.string_leaf(property, op, value, case_sensitive)
    }

    /// Lexicographic `<` (or `<=` with `with_equal`).
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_less(
        &mut self,
        property: u16,
        value: &str,
        case_sensitive: bool,
        with_equal: bool,
    ) -> StoreResult<Condition> {
        let op = if with_equal {
            Op::StringLessOrEqual
        } else {
            Op::StringLess
        };
        self.string_leaf(property, op, value, case_sensitive)
    }

    /// Matches any of `values`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::string_equal`].
    pub fn string_in(
        &mut self,
        property: u16,
        values: &[&str],
        case_sensitive: bool,
    ) -> StoreResult<Condition> {
        let values = values.iter().map(|value| (*value).to_string()).collect();
        self.leaf(
            property,
            Expect::String,
            Op::StringIn,
            Some(QueryParam::Strings(values)),
            case_sensitive,
        )
    }

    fn int_leaf(&mut self, property: u16, op: Op, param: QueryParam) -> StoreResult<Condition> {
        self.leaf(property, Expect::Integer, op, Some(param), false)
    }

    /// Integer equality. Works on every integer property and on bools.
    ///
    /// On `UInt64` properties the parameter is the bit pattern of a `u64`,
    /// so `u64::MAX as i64` selects `u64::MAX`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PropertyTypeMismatch`] unless the property is
    /// an integer or bool scalar.
    pub fn int_equal(&mut self, property: u16, value: i64) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntEqual, QueryParam::Int(value))
    }

    /// Integer inequality.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_not_equal(&mut self, property: u16, value: i64) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntNotEqual, QueryParam::Int(value))
    }

    /// Integer `>`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_greater(&mut self, property: u16, value: i64) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntGreater, QueryParam::Int(value))
    }

    /// Integer `<`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_less(&mut self, property: u16, value: i64) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntLess, QueryParam::Int(value))
    }

    /// Inclusive integer range.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_between(&mut self, property: u16, low: i64, high: i64) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntBetween, QueryParam::IntRange(low, high))
    }

    /// Matches any of `values`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_in(&mut self, property: u16, values: &[i64]) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntIn, QueryParam::Ints(values.to_vec()))
    }

    /// Matches none of `values`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::int_equal`].
    pub fn int_not_in(&mut self, property: u16, values: &[i64]) -> StoreResult<Condition> {
        self.int_leaf(property, Op::IntNotIn, QueryParam::Ints(values.to_vec()))
    }

    /// Float `>`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PropertyTypeMismatch`] unless the property is a
    /// float scalar.
    pub fn double_greater(&mut self, property: u16, value: f64) -> StoreResult<Condition> {
        let param = Some(QueryParam::Double(value));
        self.leaf(property, Expect::Float, Op::DoubleGreater, param, false)
    }

    /// Float `<`.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::double_greater`].
    pub fn double_less(&mut self, property: u16, value: f64) -> StoreResult<Condition> {
        let param = Some(QueryParam::Double(value));
        self.leaf(property, Expect::Float, Op::DoubleLess, param, false)
    }

    /// Inclusive float range.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::double_greater`].
    pub fn double_between(&mut self, property: u16, low: f64, high: f64) -> StoreResult<Condition> {
        let param = Some(QueryParam::DoubleRange(low, high));
        self.leaf(property, Expect::Float, Op::DoubleBetween, param, false)
    }

    fn bytes_leaf(&mut self, property: u16, op: Op, value: &[u8]) -> StoreResult<Condition> {
        let param = Some(QueryParam::Bytes(value.to_vec()));
        self.leaf(property, Expect::Bytes, op, param, false)
    }

    /// Byte vector equality.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PropertyTypeMismatch`] unless the property is a
    /// vector of `i8` or `u8`.
    pub fn bytes_equal(&mut self, property: u16, value: &[u8]) -> StoreResult<Condition> {
        self.bytes_leaf(property, Op::BytesEqual, value)
    }

    /// Lexicographic `>` (or `>=` with `with_equal`) on byte vectors.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::bytes_equal`].
    pub fn bytes_greater(
        &mut self,
        property: u16,
        value: &[u8],
        with_equal: bool,
    ) -> StoreResult<Condition> {
        let op = if with_equal {
            Op::BytesGreaterOrEqual
        } else {
            Op::BytesGreater
        };
        self.bytes_leaf(property, op, value)
    }

    /// Lexicographic `<` (or `<=` with `with_equal`) on byte vectors.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::bytes_equal`].
    pub fn bytes_less(
        &mut self,
        property: u16,
        value: &[u8],
        with_equal: bool,
    ) -> StoreResult<Condition> {
        let op = if with_equal {
            Op::BytesLessOrEqual
        } else {
            Op::BytesLess
        };
        self.bytes_leaf(property, op, value)
    }

    fn group(&mut self, conditions: &[Condition], all: bool) -> StoreResult<Condition> {
        if conditions.is_empty() {
            return Err(StoreError::illegal_argument("cannot combine zero conditions"));
        }
        for condition in conditions {
            match self.consumed.get(condition.0) {
                None => {
                    return Err(StoreError::illegal_argument(format!(
                        "unknown condition {}",
                        condition.0
                    )))
                }
                Some(true) => {
                    return Err(StoreError::illegal_argument(format!(
                        "condition {} is already combined",
                        condition.0
                    )))
                }
                Some(false) => {}
            }
        }
        let children: Vec<usize> = conditions.iter().map(|condition| condition.0).collect();
        for &child in &children {
            self.consumed[child] = true;
        }
        Ok(self.push(if all {
            Node::All(children)
        } else {
            Node::Any(children)
        }))
    }

    /// Combines conditions with AND.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an empty list or a
    /// condition that is unknown or already combined.
    pub fn all(&mut self, conditions: &[Condition]) -> StoreResult<Condition> {
        self.group(conditions, true)
    }

    /// Combines conditions with OR.
    ///
    /// # Errors
    ///
    /// Same as [`QueryBuilder::all`].
    pub fn any(&mut self, conditions: &[Condition]) -> StoreResult<Condition> {
        self.group(conditions, false)
    }

    /// Names the most recently added condition so its parameter can be
    /// set with [`Query::set_param`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the last condition has no
    /// parameter, or [`StoreError::IllegalArgument`] if the alias is taken.
    pub fn alias(&mut self, alias: &str) -> StoreResult<()> {
        let taken = self.nodes.iter().any(|node| {
            matches!(node, Node::Leaf(leaf) if leaf.alias.as_deref() == Some(alias))
        });
        if taken {
            return Err(StoreError::illegal_argument(format!(
                "alias {alias} is already used"
            )));
        }
        match self.nodes.last_mut() {
            Some(Node::Leaf(leaf)) if leaf.param.is_some() => {
                leaf.alias = Some(alias.to_string());
                Ok(())
            }
            _ => Err(StoreError::illegal_state(
                "alias needs a preceding condition with a parameter",
            )),
        }
    }

    /// Adds a sort key. Earlier keys take precedence; ties fall back to id
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PropertyTypeMismatch`] for nested table
    /// properties, or [`StoreError::IllegalArgument`] for unknown ones.
    pub fn order(&mut self, property: u16, flags: OrderFlags) -> StoreResult<()> {
        self.check_property(property, Expect::Any)?;
        let entity = self.entity_type()?;
        let kind = entity.schema().field(property).map(|field| &field.kind);
        if let Some(FieldKind::Table(_)) = kind {
            return Err(StoreError::type_mismatch(
                entity.property_name(property),
                "orderable property",
                "table",
            ));
        }
        self.orders.push(Order { property, flags });
        Ok(())
    }

    /// Finishes the query.
    ///
    /// # Errors
    ///
    /// Currently infallible for builders that passed every condition call.
    pub fn build(mut self) -> StoreResult<Query> {
        let roots: Vec<usize> = self
            .consumed
            .iter()
            .enumerate()
            .filter(|(_, consumed)| !**consumed)
            .map(|(index, _)| index)
            .collect();
        let root = match roots.len() {
            0 => None,
            1 => Some(roots[0]),
            _ => {
                self.nodes.push(Node::All(roots));
                Some(self.nodes.len() - 1)
            }
        };
        Ok(Query {
            store: self.store,
            entity: self.entity,
            nodes: self.nodes,
            root,
            orders: self.orders,
        })
    }
}

/// A built query. Reusable across transactions of the store it was built
/// for.
#[derive(Debug, Clone)]
pub struct Query {
    store: Store,
    entity: EntityTypeId,
    nodes: Vec<Node>,
    root: Option<usize>,
    orders: Vec<Order>,
}

impl Query {
    /// The entity type queried.
    #[must_use]
    pub fn entity(&self) -> EntityTypeId {
        self.entity
    }

    /// Objects matching the query in result order, skipping `offset` and
    /// returning at most `limit` (0 = no limit).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for a transaction of another
    /// store, [`StoreError::IllegalState`] for an ended one, or
    /// [`StoreError::FileCorrupt`] if a stored buffer cannot be read.
    pub fn find(
        &self,
        txn: &Transaction<'_>,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Bytes>> {
        let mut found = Vec::new();
        self.window(txn, offset, limit, |_, bytes| found.push(bytes.clone()))?;
        Ok(found)
    }

    /// Ids of the objects [`Query::find`] would return.
    ///
    /// # Errors
    ///
    /// Same as [`Query::find`].
    pub fn find_ids(
        &self,
        txn: &Transaction<'_>,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<u64>> {
        let mut ids = Vec::new();
        self.window(txn, offset, limit, |id, _| ids.push(id))?;
        Ok(ids)
    }

    /// The first object in result order.
    ///
    /// # Errors
    ///
    /// Same as [`Query::find`].
    pub fn find_first(&self, txn: &Transaction<'_>) -> StoreResult<Option<Bytes>> {
        Ok(self.find(txn, 0, 1)?.pop())
    }

    /// The only matching object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NonUniqueResult`] if more than one object
    /// matches, otherwise as [`Query::find`].
    pub fn find_unique(&self, txn: &Transaction<'_>) -> StoreResult<Option<Bytes>> {
        let mut found = self.find(txn, 0, 0)?;
        if found.len() > 1 {
            return Err(StoreError::NonUniqueResult {
                count: found.len() as u64,
            });
        }
        Ok(found.pop())
    }

    /// Number of matching objects.
    ///
    /// # Errors
    ///
    /// Same as [`Query::find`].
    pub fn count(&self, txn: &Transaction<'_>) -> StoreResult<u64> {
        let mut count = 0;
        self.scan(txn, false, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Removes all matching objects. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] outside a write transaction,
    /// otherwise as [`Query::find`].
    pub fn remove(&self, txn: &mut Transaction<'_>) -> StoreResult<u64> {
        if !txn.is_write() {
            return Err(StoreError::illegal_state(
                "query remove needs a write transaction",
            ));
        }
        let mut ids = Vec::new();
        self.scan(txn, false, |id, _| {
            ids.push(id);
            true
        })?;
        let mut cursor = txn.cursor(self.entity)?;
        let mut removed = 0;
        for id in ids {
            if cursor.remove(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Calls `visitor` with each match in result order until it returns
    /// false.
    ///
    /// # Errors
    ///
    /// Same as [`Query::find`].
    pub fn visit<F>(&self, txn: &Transaction<'_>, mut visitor: F) -> StoreResult<()>
    where
        F: FnMut(u64, &[u8]) -> bool,
    {
        self.scan(txn, true, |id, bytes| visitor(id, bytes))
    }

    /// Replaces the parameter of one condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] if no condition or more than
    /// one matches the target, or the value has the wrong shape.
    pub fn set_param<'a>(
        &mut self,
        target: impl Into<ParamTarget<'a>>,
        value: QueryParam,
    ) -> StoreResult<()> {
        let target = target.into();
        let mut matching = self.nodes.iter_mut().filter_map(|node| match node {
            Node::Leaf(leaf) if leaf.param.is_some() => match target {
                ParamTarget::Property(property) => (leaf.property == property).then_some(leaf),
                ParamTarget::Alias(alias) => (leaf.alias.as_deref() == Some(alias)).then_some(leaf),
            },
            _ => None,
        });
        let Some(leaf) = matching.next() else {
            return Err(StoreError::illegal_argument(format!(
                "no parameterized condition for {target:?}"
            )));
        };
        if matching.next().is_some() {
            return Err(StoreError::illegal_argument(format!(
                "several conditions match {target:?}, use an alias"
            )));
        }
        let current = leaf.param.as_ref().map_or("none", QueryParam::kind_name);
        if current != value.kind_name() {
            return Err(StoreError::illegal_argument(format!(
                "parameter for {target:?} must be {current}, got {}",
                value.kind_name()
            )));
        }
        leaf.param = Some(value);
        Ok(())
    }

    /// Short description: entity, condition count and properties used.
    #[must_use]
    pub fn describe(&self) -> String {
        let entity = self.store.model().entity(self.entity);
        let name = entity.map_or("?", EntityType::name);
        let mut properties: Vec<u16> = Vec::new();
        let mut conditions = 0;
        for node in &self.nodes {
            if let Node::Leaf(leaf) = node {
                conditions += 1;
                if !properties.contains(&leaf.property) {
                    properties.push(leaf.property);
                }
            }
        }
        let mut out = format!("Query for entity {name} with {conditions} conditions");
        if !properties.is_empty() {
            let names: Vec<String> = properties
                .iter()
                .map(|property| self.property_label(*property))
                .collect();
            let _ = write!(out, " with properties {}", names.join(", "));
        }
        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|order| {
                    let direction = if order.flags.contains(OrderFlags::DESCENDING) {
                        "desc"
                    } else {
                        "asc"
                    };
                    format!("{} {direction}", self.property_label(order.property))
                })
                .collect();
            let _ = write!(out, " ordered by {}", orders.join(", "));
        }
        out
    }

    /// The condition tree with current parameter values.
    #[must_use]
    pub fn describe_params(&self) -> String {
        match self.root {
            Some(root) => self.describe_node(root, true),
            None => "TRUE".to_string(),
        }
    }

    fn describe_node(&self, index: usize, top: bool) -> String {
        match &self.nodes[index] {
            Node::Leaf(leaf) => {
                let label = self.property_label(leaf.property);
                let mut out = format!("{label} {}", leaf.op.symbol());
                if let Some(param) = &leaf.param {
                    let _ = write!(out, " {param}");
                }
                if leaf.op.is_string() && !leaf.case_sensitive {
                    out.push_str(" (case insensitive)");
                }
                out
            }
            Node::All(children) | Node::Any(children) => {
                let joiner = if matches!(self.nodes[index], Node::All(_)) {
                    " AND "
                } else {
                    " OR "
                };
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| self.describe_node(*child, false))
                    .collect();
                let joined = parts.join(joiner);
                if top || children.len() == 1 {
                    joined
                } else {
                    format!("({joined})")
                }
            }
        }
    }

    fn property_label(&self, property: u16) -> String {
        self.store
            .model()
            .entity(self.entity)
            .and_then(|entity| entity.schema().field(property))
            .map_or_else(|| format!("#{property}"), |field| field.name.to_string())
    }

    /// Feeds the matches between `offset` and `offset + limit` to `sink`.
    fn window(
        &self,
        txn: &Transaction<'_>,
        offset: usize,
        limit: usize,
        mut sink: impl FnMut(u64, &Bytes),
    ) -> StoreResult<()> {
        let mut skipped = 0;
        let mut taken = 0;
        self.scan_bytes(txn, true, |id, bytes| {
            if skipped < offset {
                skipped += 1;
                return true;
            }
            sink(id, bytes);
            taken += 1;
            limit == 0 || taken < limit
        })
    }

    fn scan(
        &self,
        txn: &Transaction<'_>,
        ordered: bool,
        mut visitor: impl FnMut(u64, &[u8]) -> bool,
    ) -> StoreResult<()> {
        self.scan_bytes(txn, ordered, |id, bytes| visitor(id, &bytes[..]))
    }

    /// Visits matches, sorted when `ordered` and sort keys exist, until
    /// `visitor` returns false.
    fn scan_bytes(
        &self,
        txn: &Transaction<'_>,
        ordered: bool,
        mut visitor: impl FnMut(u64, &Bytes) -> bool,
    ) -> StoreResult<()> {
        if !self.store.same_store(txn.store()) {
            return Err(StoreError::illegal_argument(
                "transaction belongs to another store",
            ));
        }
        let entity = self.store.model().require_entity(self.entity)?;
        self.log(entity);

        let Some(data) = txn.snapshot()?.entity(self.entity) else {
            return Ok(());
        };
        let schema = entity.schema();

        if !ordered || self.orders.is_empty() {
            for (id, bytes) in &data.objects {
                let table = flatrec_codec::root(bytes, schema)?;
                if self.matches(&table)? && !visitor(*id, bytes) {
                    break;
                }
            }
            return Ok(());
        }

        let mut hits = Vec::new();
        for (id, bytes) in &data.objects {
            let table = flatrec_codec::root(bytes, schema)?;
            if self.matches(&table)? {
                let keys = self
                    .orders
                    .iter()
                    .map(|order| sort_key(&table, *order))
                    .collect::<StoreResult<Vec<_>>>()?;
                hits.push((keys, *id, bytes));
            }
        }
        hits.sort_by(|a, b| {
            self.orders
                .iter()
                .zip(a.0.iter().zip(&b.0))
                .map(|(order, (left, right))| compare_keys(left, right, order.flags))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        for (_, id, bytes) in hits {
            if !visitor(id, bytes) {
                break;
            }
        }
        Ok(())
    }

    fn log(&self, entity: &EntityType) {
        let flags = self.store.debug_flags();
        if flags.contains(DebugFlags::LOG_QUERY_PARAMETERS) {
            debug!(entity = entity.name(), query = %self.describe_params(), "query");
        } else if flags.contains(DebugFlags::LOG_QUERIES) {
            debug!(entity = entity.name(), query = %self.describe(), "query");
        }
    }

    fn matches(&self, table: &Table<'_>) -> StoreResult<bool> {
        match self.root {
            Some(root) => self.eval(root, table),
            None => Ok(true),
        }
    }

    fn eval(&self, index: usize, table: &Table<'_>) -> StoreResult<bool> {
        match &self.nodes[index] {
            Node::Leaf(leaf) => eval_leaf(leaf, table),
            Node::All(children) => {
                for child in children {
                    if !self.eval(*child, table)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Node::Any(children) => {
                for child in children {
                    if self.eval(*child, table)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn fold(value: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.to_lowercase())
    }
}

/// Integer parameters on `UInt64` properties carry the bit pattern of a `u64`.
#[allow(clippy::cast_sign_loss)]
fn int_key(n: i64, unsigned: bool) -> i128 {
    if unsigned {
        i128::from(n as u64)
    } else {
        i128::from(n)
    }
}

fn eval_leaf(leaf: &Leaf, table: &Table<'_>) -> StoreResult<bool> {
    let property = leaf.property;
    let param = leaf.param.as_ref();

    let result = match leaf.op {
        Op::IsNull => !table.is_present(property),
        Op::NotNull => table.is_present(property),
        op if op.is_string() => {
            let Some(value) = table.string(property)? else {
                return Ok(false);
            };
            let value = fold(value, leaf.case_sensitive);
            match (op, param) {
                (Op::StringIn, Some(QueryParam::Strings(candidates))) => candidates
                    .iter()
                    .any(|candidate| fold(candidate, leaf.case_sensitive) == value),
                (_, Some(QueryParam::String(expected))) => {
                    let expected = fold(expected, leaf.case_sensitive);
                    match op {
                        Op::StringEqual => value == expected,
                        Op::StringNotEqual => value != expected,
                        Op::StringContains => value.contains(&*expected),
                        Op::StringStartsWith => value.starts_with(&*expected),
                        Op::StringEndsWith => value.ends_with(&*expected),
                        Op::StringGreater => value > expected,
                        Op::StringGreaterOrEqual => value >= expected,
                        Op::StringLess => value < expected,
                        Op::StringLessOrEqual => value <= expected,
                        _ => false,
                    }
                }
                _ => false,
            }
        }
        Op::IntEqual
        | Op::IntNotEqual
        | Op::IntGreater
        | Op::IntLess
        | Op::IntBetween
        | Op::IntIn
        | Op::IntNotIn => {
            let value = table.get_value(property)?;
            let unsigned = value.scalar_type() == ScalarType::UInt64;
            let key = |n: &i64| int_key(*n, unsigned);
            let value = match value {
                ScalarValue::UInt64(v) => i128::from(v),
                other => i128::from(other.as_i64().unwrap_or_default()),
            };
            match (leaf.op, param) {
                (Op::IntEqual, Some(QueryParam::Int(expected))) => value == key(expected),
                (Op::IntNotEqual, Some(QueryParam::Int(expected))) => value != key(expected),
                (Op::IntGreater, Some(QueryParam::Int(expected))) => value > key(expected),
                (Op::IntLess, Some(QueryParam::Int(expected))) => value < key(expected),
                (Op::IntBetween, Some(QueryParam::IntRange(low, high))) => {
                    (key(low)..=key(high)).contains(&value)
                }
                (Op::IntIn, Some(QueryParam::Ints(values))) => {
                    values.iter().any(|n| key(n) == value)
                }
                (Op::IntNotIn, Some(QueryParam::Ints(values))) => {
                    !values.iter().any(|n| key(n) == value)
                }
                _ => false,
            }
        }
        Op::DoubleGreater | Op::DoubleLess | Op::DoubleBetween => {
            let value = table.get_value(property)?.as_f64();
            match (leaf.op, param) {
                (Op::DoubleGreater, Some(QueryParam::Double(expected))) => value > *expected,
                (Op::DoubleLess, Some(QueryParam::Double(expected))) => value < *expected,
                (Op::DoubleBetween, Some(QueryParam::DoubleRange(low, high))) => {
                    value >= *low && value <= *high
                }
                _ => false,
            }
        }
        Op::BytesEqual
        | Op::BytesGreater
        | Op::BytesGreaterOrEqual
        | Op::BytesLess
        | Op::BytesLessOrEqual => {
            let Some(vector) = table.raw_vector(property)? else {
                return Ok(false);
            };
            let Some(QueryParam::Bytes(expected)) = param else {
                return Ok(false);
            };
            let value = vector.bytes();
            let expected = expected.as_slice();
            match leaf.op {
                Op::BytesEqual => value == expected,
                Op::BytesGreater => value > expected,
                Op::BytesGreaterOrEqual => value >= expected,
                Op::BytesLess => value < expected,
                _ => value <= expected,
            }
        }
        _ => false,
    };
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

#[allow(clippy::cast_sign_loss)]
fn sort_key(table: &Table<'_>, order: Order) -> StoreResult<SortKey> {
    let property = order.property;
    let flags = order.flags;
    let nulls_zero = flags.contains(OrderFlags::NULLS_ZERO);
    let kind = table
        .schema()
        .field(property)
        .map(|field| field.kind.clone());

    let key = match kind {
        Some(FieldKind::Scalar(ty)) => {
            let value = table.get_value(property)?;
            if ty.is_float() {
                SortKey::Float(value.as_f64())
            } else if ty.is_unsigned() || flags.contains(OrderFlags::UNSIGNED) {
                SortKey::UInt(value.as_i64().unwrap_or_default() as u64)
            } else {
                SortKey::Int(value.as_i64().unwrap_or_default())
            }
        }
        Some(FieldKind::String) => match table.string(property)? {
            Some(text) => {
                SortKey::Text(fold(text, flags.contains(OrderFlags::CASE_SENSITIVE)).into_owned())
            }
            None if nulls_zero => SortKey::Text(String::new()),
            None => SortKey::Null,
        },
        Some(FieldKind::Vector(_)) => match table.raw_vector(property)? {
            Some(vector) => SortKey::Bytes(vector.bytes().to_vec()),
            None if nulls_zero => SortKey::Bytes(Vec::new()),
            None => SortKey::Null,
        },
        Some(FieldKind::Table(_)) | None => SortKey::Null,
    };
    Ok(key)
}

fn compare_keys(left: &SortKey, right: &SortKey, flags: OrderFlags) -> Ordering {
    let nulls_last = flags.contains(OrderFlags::NULLS_LAST);
    let ordering = match (left, right) {
        (SortKey::Null, SortKey::Null) => return Ordering::Equal,
        (SortKey::Null, _) => {
            return if nulls_last {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (_, SortKey::Null) => {
            return if nulls_last {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
        (SortKey::UInt(a), SortKey::UInt(b)) => a.cmp(b),
        (SortKey::Float(a), SortKey::Float(b)) => a.total_cmp(b),
        (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        (SortKey::Bytes(a), SortKey::Bytes(b)) => a.cmp(b),
        _ => Ordering::Equal,
    };
    if flags.contains(OrderFlags::DESCENDING) {
        ordering.reverse()
    } else {
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::types::PutMode;
    use flatrec_codec::{FieldDef, Record, TableSchema};

    static FIELDS: [FieldDef; 6] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::string(1, "name"),
        FieldDef::scalar(2, "age", ScalarType::Int32),
        FieldDef::scalar(3, "score", ScalarType::Float64),
        FieldDef::vector(4, "tag", ScalarType::UInt8),
        FieldDef::scalar(5, "rank", ScalarType::UInt64),
    ];
    static PERSON: TableSchema = TableSchema::new("Person", &FIELDS);

    const NAME: u16 = 1;
    const AGE: u16 = 2;
    const SCORE: u16 = 3;
    const TAG: u16 = 4;
    const RANK: u16 = 5;

    fn person(id: u64, name: Option<&str>, age: i32, score: f64, tag: &[u8]) -> Vec<u8> {
        let mut record = Record::new().with(0, id).with(AGE, age).with(SCORE, score);
        if let Some(name) = name {
            record.set(NAME, name);
        }
        if !tag.is_empty() {
            record.set(TAG, tag.to_vec());
        }
        record.to_bytes(&PERSON).unwrap()
    }

    fn setup() -> (Store, EntityTypeId) {
        let mut model = Model::new();
        let entity = model.add_entity(&PERSON, 0).unwrap();
        let store = Store::open_in_memory(model).unwrap();
        store
            .write(|txn| {
                let mut cursor = txn.cursor(entity)?;
                let rows = [
                    person(1, Some("Alice"), 30, 1.5, b"ab"),
                    person(2, Some("bob"), 17, 2.5, b"b"),
                    person(3, Some("Carol"), 45, 0.5, b""),
                    person(4, None, 30, 3.0, b"a"),
                    person(5, Some("alicia"), 22, 2.0, b"abc"),
                ];
                for (index, row) in rows.into_iter().enumerate() {
                    cursor.put(index as u64 + 1, row, PutMode::Put)?;
                }
                Ok(())
            })
            .unwrap();
        (store, entity)
    }

    fn ids(store: &Store, query: &Query) -> Vec<u64> {
        let txn = store.begin_read().unwrap();
        query.find_ids(&txn, 0, 0).unwrap()
    }

    fn run(store: &Store, entity: EntityTypeId, f: impl FnOnce(&mut QueryBuilder)) -> Vec<u64> {
        let mut qb = store.query(entity).unwrap();
        f(&mut qb);
        ids(store, &qb.build().unwrap())
    }

    fn matching(
        store: &Store,
        entity: EntityTypeId,
        condition: impl FnOnce(&mut QueryBuilder) -> StoreResult<Condition>,
    ) -> Vec<u64> {
        run(store, entity, |qb| {
            condition(qb).unwrap();
        })
    }

    #[test]
    fn no_conditions_match_everything() {
        let (store, entity) = setup();
        assert_eq!(run(&store, entity, |_| {}), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn string_conditions() {
        let (store, entity) = setup();
        let q = |f: fn(&mut QueryBuilder) -> StoreResult<Condition>| matching(&store, entity, f);

        assert_eq!(q(|qb| qb.string_equal(NAME, "alice", false)), vec![1]);
        assert!(q(|qb| qb.string_equal(NAME, "alice", true)).is_empty());
        assert_eq!(q(|qb| qb.string_starts_with(NAME, "ali", false)), vec![1, 5]);
        assert_eq!(q(|qb| qb.string_starts_with(NAME, "ali", true)), vec![5]);
        assert_eq!(q(|qb| qb.string_contains(NAME, "O", false)), vec![2, 3]);
        assert_eq!(q(|qb| qb.string_ends_with(NAME, "ol", true)), vec![3]);
        assert_eq!(
            q(|qb| qb.string_not_equal(NAME, "bob", false)),
            vec![1, 3, 5]
        );
        assert_eq!(
            q(|qb| qb.string_in(NAME, &["BOB", "carol"], false)),
            vec![2, 3]
        );
        assert_eq!(
            q(|qb| qb.string_greater(NAME, "bob", false, true)),
            vec![2, 3]
        );
        assert_eq!(
            q(|qb| qb.string_less(NAME, "bob", false, false)),
            vec![1, 5]
        );
    }

    #[test]
    fn null_conditions() {
        let (store, entity) = setup();
        assert_eq!(matching(&store, entity, |qb| qb.null(NAME)), vec![4]);
        assert_eq!(matching(&store, entity, |qb| qb.null(TAG)), vec![3]);
        assert_eq!(
            matching(&store, entity, |qb| qb.not_null(NAME)),
            vec![1, 2, 3, 5]
        );
        assert!(matching(&store, entity, |qb| qb.not_null(RANK)).is_empty());
    }

    #[test]
    fn integer_conditions() {
        let (store, entity) = setup();
        let q = |f: fn(&mut QueryBuilder) -> StoreResult<Condition>| matching(&store, entity, f);

        assert_eq!(q(|qb| qb.int_equal(AGE, 30)), vec![1, 4]);
        assert_eq!(q(|qb| qb.int_not_equal(AGE, 30)), vec![2, 3, 5]);
        assert_eq!(q(|qb| qb.int_greater(AGE, 30)), vec![3]);
        assert_eq!(q(|qb| qb.int_less(AGE, 22)), vec![2]);
        assert_eq!(q(|qb| qb.int_between(AGE, 22, 30)), vec![1, 4, 5]);
        assert_eq!(q(|qb| qb.int_in(AGE, &[17, 45])), vec![2, 3]);
        assert_eq!(q(|qb| qb.int_not_in(AGE, &[17, 45])), vec![1, 4, 5]);
        assert_eq!(q(|qb| qb.int_equal(RANK, 0)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn double_conditions() {
        let (store, entity) = setup();
        let q = |f: fn(&mut QueryBuilder) -> StoreResult<Condition>| matching(&store, entity, f);

        assert_eq!(q(|qb| qb.double_greater(SCORE, 2.0)), vec![2, 4]);
        assert_eq!(q(|qb| qb.double_less(SCORE, 1.5)), vec![3]);
        assert_eq!(
            q(|qb| qb.double_between(SCORE, 1.5, 2.5)),
            vec![1, 2, 5]
        );
    }

    #[test]
    fn bytes_conditions() {
        let (store, entity) = setup();
        let q = |f: fn(&mut QueryBuilder) -> StoreResult<Condition>| matching(&store, entity, f);

        assert_eq!(q(|qb| qb.bytes_equal(TAG, b"ab")), vec![1]);
        assert_eq!(q(|qb| qb.bytes_greater(TAG, b"ab", false)), vec![2, 5]);
        assert_eq!(q(|qb| qb.bytes_greater(TAG, b"ab", true)), vec![1, 2, 5]);
        assert_eq!(q(|qb| qb.bytes_less(TAG, b"ab", false)), vec![4]);
        assert_eq!(q(|qb| qb.bytes_less(TAG, b"ab", true)), vec![1, 4]);
    }

    #[test]
    fn property_kinds_are_checked() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        let code = |err: StoreError| err.code();

        assert_eq!(
            code(qb.string_equal(AGE, "x", false).unwrap_err()),
            StoreError::CODE_PROPERTY_TYPE_MISMATCH
        );
        assert_eq!(
            code(qb.int_equal(NAME, 1).unwrap_err()),
            StoreError::CODE_PROPERTY_TYPE_MISMATCH
        );
        assert_eq!(
            code(qb.double_greater(AGE, 1.0).unwrap_err()),
            StoreError::CODE_PROPERTY_TYPE_MISMATCH
        );
        assert_eq!(
            code(qb.bytes_equal(NAME, b"x").unwrap_err()),
            StoreError::CODE_PROPERTY_TYPE_MISMATCH
        );
        assert_eq!(
            code(qb.null(42).unwrap_err()),
            StoreError::CODE_ILLEGAL_ARGUMENT
        );
    }

    #[test]
    fn composition() {
        let (store, entity) = setup();

        let both = run(&store, entity, |qb| {
            qb.int_equal(AGE, 30).unwrap();
            qb.not_null(NAME).unwrap();
        });
        assert_eq!(both, vec![1]);

        let either = run(&store, entity, |qb| {
            let young = qb.int_less(AGE, 20).unwrap();
            let old = qb.int_greater(AGE, 40).unwrap();
            qb.any(&[young, old]).unwrap();
        });
        assert_eq!(either, vec![2, 3]);

        let nested = run(&store, entity, |qb| {
            let young = qb.int_less(AGE, 25).unwrap();
            let named = qb.string_starts_with(NAME, "a", false).unwrap();
            let group = qb.all(&[young, named]).unwrap();
            let unnamed = qb.null(NAME).unwrap();
            qb.any(&[group, unnamed]).unwrap();
        });
        assert_eq!(nested, vec![4, 5]);
    }

    #[test]
    fn combining_errors() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        let first = qb.int_less(AGE, 25).unwrap();
        qb.any(&[first]).unwrap();
        assert!(qb.all(&[first]).is_err());
        assert!(qb.all(&[]).is_err());
        assert!(qb.all(&[Condition(99)]).is_err());
    }

    #[test]
    fn ordering() {
        let (store, entity) = setup();

        let by_name = run(&store, entity, |qb| qb.order(NAME, OrderFlags::empty()).unwrap());
        assert_eq!(by_name, vec![4, 1, 5, 2, 3]);

        let nulls_last = run(&store, entity, |qb| {
            qb.order(NAME, OrderFlags::NULLS_LAST).unwrap();
        });
        assert_eq!(nulls_last, vec![1, 5, 2, 3, 4]);

        let case_sensitive = run(&store, entity, |qb| {
            qb.order(NAME, OrderFlags::CASE_SENSITIVE | OrderFlags::NULLS_LAST)
                .unwrap();
        });
        assert_eq!(case_sensitive, vec![1, 3, 5, 2, 4]);

        let descending = run(&store, entity, |qb| {
            qb.order(AGE, OrderFlags::DESCENDING).unwrap();
        });
        assert_eq!(descending, vec![3, 1, 4, 5, 2]);

        let two_keys = run(&store, entity, |qb| {
            qb.order(AGE, OrderFlags::empty()).unwrap();
            qb.order(SCORE, OrderFlags::DESCENDING).unwrap();
        });
        assert_eq!(two_keys, vec![2, 5, 4, 1, 3]);

        let nulls_zero = run(&store, entity, |qb| {
            qb.order(TAG, OrderFlags::NULLS_ZERO | OrderFlags::NULLS_LAST).unwrap();
        });
        assert_eq!(nulls_zero, vec![3, 4, 1, 5, 2]);
    }

    #[test]
    fn unsigned_ordering() {
        let mut model = Model::new();
        let entity = model.add_entity(&PERSON, 0).unwrap();
        let store = Store::open_in_memory(model).unwrap();
        store
            .write(|txn| {
                let mut cursor = txn.cursor(entity)?;
                for (id, rank) in [(1u64, u64::MAX), (2, 1), (3, 0)] {
                    let bytes = Record::new().with(0, id).with(RANK, rank).to_bytes(&PERSON)?;
                    cursor.put(id, bytes, PutMode::Put)?;
                }
                Ok(())
            })
            .unwrap();
        let by_rank = run(&store, entity, |qb| qb.order(RANK, OrderFlags::empty()).unwrap());
        assert_eq!(by_rank, vec![3, 2, 1]);
    }

    #[test]
    fn unsigned_int_conditions() {
        let mut model = Model::new();
        let entity = model.add_entity(&PERSON, 0).unwrap();
        let store = Store::open_in_memory(model).unwrap();
        store
            .write(|txn| {
                let mut cursor = txn.cursor(entity)?;
                for (id, rank) in [(1u64, u64::MAX), (2, 3), (3, 1 << 63)] {
                    let bytes = Record::new().with(0, id).with(RANK, rank).to_bytes(&PERSON)?;
                    cursor.put(id, bytes, PutMode::Put)?;
                }
                Ok(())
            })
            .unwrap();
        let q = |f: fn(&mut QueryBuilder) -> StoreResult<Condition>| matching(&store, entity, f);

        assert_eq!(q(|qb| qb.int_greater(RANK, 5)), vec![1, 3]);
        assert_eq!(q(|qb| qb.int_less(RANK, 5)), vec![2]);
        assert_eq!(q(|qb| qb.int_equal(RANK, -1)), vec![1]);
        assert_eq!(q(|qb| qb.int_between(RANK, 0, i64::MAX)), vec![2]);
        assert_eq!(q(|qb| qb.int_in(RANK, &[i64::MIN, 3])), vec![2, 3]);
        assert_eq!(q(|qb| qb.int_not_in(RANK, &[-1])), vec![2, 3]);
    }

    #[test]
    fn offset_limit_first_and_unique() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        qb.order(AGE, OrderFlags::empty()).unwrap();
        let query = qb.build().unwrap();

        let txn = store.begin_read().unwrap();
        assert_eq!(query.find_ids(&txn, 1, 2).unwrap(), vec![5, 1]);
        assert_eq!(query.find_ids(&txn, 4, 0).unwrap(), vec![3]);
        assert!(query.find_ids(&txn, 9, 0).unwrap().is_empty());
        assert_eq!(query.find(&txn, 0, 3).unwrap().len(), 3);
        assert_eq!(query.count(&txn).unwrap(), 5);

        let first = query.find_first(&txn).unwrap().unwrap();
        let table = flatrec_codec::root(&first, &PERSON).unwrap();
        assert_eq!(table.get::<u64>(0).unwrap(), 2);

        let err = query.find_unique(&txn).unwrap_err();
        assert!(matches!(err, StoreError::NonUniqueResult { count: 5 }));

        let mut qb = store.query(entity).unwrap();
        qb.int_equal(AGE, 45).unwrap();
        let query = qb.build().unwrap();
        assert!(query.find_unique(&txn).unwrap().is_some());
    }

    #[test]
    fn parameters_can_change() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        qb.int_greater(AGE, 40).unwrap();
        qb.string_starts_with(NAME, "c", false).unwrap();
        qb.alias("prefix").unwrap();
        let mut query = qb.build().unwrap();
        assert_eq!(ids(&store, &query), vec![3]);

        query.set_param(AGE, QueryParam::Int(20)).unwrap();
        query
            .set_param("prefix", QueryParam::String("ALI".into()))
            .unwrap();
        assert_eq!(ids(&store, &query), vec![1, 5]);

        let err = query
            .set_param(AGE, QueryParam::String("x".into()))
            .unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_ARGUMENT);
        assert!(query.set_param("missing", QueryParam::Int(1)).is_err());
        assert!(query.set_param(SCORE, QueryParam::Double(1.0)).is_err());
    }

    #[test]
    fn ambiguous_property_param_needs_alias() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        qb.int_greater(AGE, 20).unwrap();
        qb.int_less(AGE, 40).unwrap();
        qb.alias("upper").unwrap();
        let mut query = qb.build().unwrap();

        assert!(query.set_param(AGE, QueryParam::Int(1)).is_err());
        query.set_param("upper", QueryParam::Int(31)).unwrap();
        assert_eq!(ids(&store, &query), vec![1, 4, 5]);
    }

    #[test]
    fn alias_rules() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        assert!(qb.alias("none").is_err());
        qb.null(NAME).unwrap();
        assert_eq!(
            qb.alias("null").unwrap_err().code(),
            StoreError::CODE_ILLEGAL_STATE
        );
        qb.int_equal(AGE, 1).unwrap();
        qb.alias("age").unwrap();
        qb.int_equal(RANK, 1).unwrap();
        assert!(qb.alias("age").is_err());
    }

    #[test]
    fn descriptions() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        let adult = qb.int_greater(AGE, 17).unwrap();
        let named = qb.string_starts_with(NAME, "A", false).unwrap();
        qb.any(&[adult, named]).unwrap();
        qb.bytes_equal(TAG, &[0xab, 0x01]).unwrap();
        qb.order(NAME, OrderFlags::DESCENDING).unwrap();
        let query = qb.build().unwrap();

        assert_eq!(
            query.describe(),
            "Query for entity Person with 3 conditions with properties age, name, tag \
             ordered by name desc"
        );
        assert_eq!(
            query.describe_params(),
            "(age > 17 OR name starts with \"A\" (case insensitive)) AND tag == 0xab01"
        );

        let empty = store.query(entity).unwrap().build().unwrap();
        assert_eq!(empty.describe_params(), "TRUE");
    }

    #[test]
    fn visit_stops_early() {
        let (store, entity) = setup();
        let query = store.query(entity).unwrap().build().unwrap();
        let txn = store.begin_read().unwrap();
        let mut seen = Vec::new();
        query
            .visit(&txn, |id, _| {
                seen.push(id);
                seen.len() < 2
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn remove_matches() {
        let (store, entity) = setup();
        let mut qb = store.query(entity).unwrap();
        qb.int_equal(AGE, 30).unwrap();
        let query = qb.build().unwrap();

        let mut reader = store.begin_read().unwrap();
        assert_eq!(
            query.remove(&mut reader).unwrap_err().code(),
            StoreError::CODE_ILLEGAL_STATE
        );
        drop(reader);

        let removed = store.write(|txn| query.remove(txn)).unwrap();
        assert_eq!(removed, 2);
        let all = store.query(entity).unwrap().build().unwrap();
        assert_eq!(ids(&store, &all), vec![2, 3, 5]);
    }

    #[test]
    fn foreign_transaction_rejected() {
        let (store, entity) = setup();
        let (other, _) = setup();
        let query = store.query(entity).unwrap().build().unwrap();
        let txn = other.begin_read().unwrap();
        let err = query.count(&txn).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_ARGUMENT);
    }
}
