//! Per-schema code generation.

/// Declares a table schema and generates typed code for it.
///
/// The macro expands to a module holding:
///
/// - `SCHEMA`, the static [`TableSchema`](crate::TableSchema), and `IDENTIFIER`
/// - `field`, one `u16` index constant per field
/// - `Record`, an owned struct with one public member per field
/// - `Reader<'a>`, a zero-copy view with one accessor per field
/// - `create(builder, &Record)` and `clone(builder, Reader)`
/// - a [`TableRecord`](crate::TableRecord) impl for `Record`, plus an
///   [`Entity`](crate::Entity) impl when an `id` field is named
///
/// Field kinds are a scalar type (`bool`, `i8` .. `u64`, `f32`, `f64`),
/// `string`, `vector<T>` for a scalar `T`, or `table<m>` where `m` is a
/// sibling module generated by this macro. Scalars may carry a default
/// (`= 5`). Field attributes `#[required]` and `#[deprecated]` map to the
/// matching [`FieldDef`](crate::FieldDef) flags.
///
/// Reader accessors share a namespace with `from_root`, `from_table`,
/// `as_table` and `to_record`, so fields cannot use those names.
///
/// # Example
///
/// ```
/// flatrec_codec::define_table! {
///     /// A monitored sensor.
///     pub mod sensor {
///         table Sensor;
///         identifier b"SENS";
///         id id;
///         fields {
///             0 => id: u64,
///             1 => label: string,
///             2 => threshold: f32 = 1.5,
///             3 => readings: vector<i16>,
///         }
///     }
/// }
///
/// use flatrec_codec::TableRecord;
///
/// let record = sensor::Record {
///     id: 3,
///     label: Some("boiler".into()),
///     readings: Some(vec![20, 21, 19]),
///     ..Default::default()
/// };
/// let bytes = record.to_bytes().unwrap();
///
/// let reader = sensor::Reader::from_root(&bytes).unwrap();
/// assert_eq!(reader.label().unwrap(), Some("boiler"));
/// assert_eq!(reader.threshold().unwrap(), 1.5);
/// assert_eq!(sensor::Record::from_bytes(&bytes).unwrap(), record);
/// ```
#[macro_export]
macro_rules! define_table {
    (@identifier) => { ::core::option::Option::None };
    (@identifier $ident:literal) => { ::core::option::Option::Some(*$ident) };

    (@count) => { 0usize };
    (@count $head:ident $($tail:ident)*) => { 1usize + $crate::define_table!(@count $($tail)*) };

    (@def $index:literal, $name:ident, string) => {
        $crate::FieldDef::string($index, stringify!($name))
    };
    (@def $index:literal, $name:ident, vector <$t:ident>) => {
        $crate::FieldDef::vector($index, stringify!($name), <$t as $crate::Scalar>::TYPE)
    };
    (@def $index:literal, $name:ident, table <$m:ident>) => {
        $crate::FieldDef::table($index, stringify!($name), &super::$m::SCHEMA)
    };
    (@def $index:literal, $name:ident, $t:ident = $default:expr) => {
        $crate::FieldDef::scalar($index, stringify!($name), <$t as $crate::Scalar>::TYPE)
            .with_default($crate::define_table!(@scalar_value $t, $default))
    };
    (@def $index:literal, $name:ident, $t:ident) => {
        $crate::FieldDef::scalar($index, stringify!($name), <$t as $crate::Scalar>::TYPE)
    };

    (@scalar_value bool, $v:expr) => { $crate::ScalarValue::Bool($v) };
    (@scalar_value i8, $v:expr) => { $crate::ScalarValue::Int8($v) };
    (@scalar_value u8, $v:expr) => { $crate::ScalarValue::UInt8($v) };
    (@scalar_value i16, $v:expr) => { $crate::ScalarValue::Int16($v) };
    (@scalar_value u16, $v:expr) => { $crate::ScalarValue::UInt16($v) };
    (@scalar_value i32, $v:expr) => { $crate::ScalarValue::Int32($v) };
    (@scalar_value u32, $v:expr) => { $crate::ScalarValue::UInt32($v) };
    (@scalar_value i64, $v:expr) => { $crate::ScalarValue::Int64($v) };
    (@scalar_value u64, $v:expr) => { $crate::ScalarValue::UInt64($v) };
    (@scalar_value f32, $v:expr) => { $crate::ScalarValue::Float32($v) };
    (@scalar_value f64, $v:expr) => { $crate::ScalarValue::Float64($v) };

    (@record_type string) => { ::core::option::Option<::std::string::String> };
    (@record_type vector <$t:ident>) => { ::core::option::Option<::std::vec::Vec<$t>> };
    (@record_type table <$m:ident>) => { ::core::option::Option<super::$m::Record> };
    (@record_type $t:ident) => { $t };

    (@default_value string) => { ::core::option::Option::None };
    (@default_value vector <$t:ident>) => { ::core::option::Option::None };
    (@default_value table <$m:ident>) => { ::core::option::Option::None };
    (@default_value $t:ident = $default:expr) => { $default };
    (@default_value $t:ident) => { <$t as ::core::default::Default>::default() };

    (@getter $lt:lifetime, $index:literal, $name:ident, string) => {
        #[doc = concat!("`", stringify!($name), "`, `None` when absent.")]
        ///
        /// # Errors
        ///
        /// Fails if the buffer is damaged or the string is not UTF-8.
        pub fn $name(&self) -> $crate::CodecResult<::core::option::Option<&$lt str>> {
            self.table.string($index)
        }
    };
    (@getter $lt:lifetime, $index:literal, $name:ident, vector <$t:ident>) => {
        #[doc = concat!("`", stringify!($name), "`, `None` when absent.")]
        ///
        /// # Errors
        ///
        /// Fails if the buffer is damaged.
        pub fn $name(
            &self,
        ) -> $crate::CodecResult<::core::option::Option<$crate::Vector<$lt, $t>>> {
            self.table.vector::<$t>($index)
        }
    };
    (@getter $lt:lifetime, $index:literal, $name:ident, table <$m:ident>) => {
        #[doc = concat!("`", stringify!($name), "`, `None` when absent.")]
        ///
        /// # Errors
        ///
        /// Fails if the buffer is damaged.
        pub fn $name(
            &self,
        ) -> $crate::CodecResult<::core::option::Option<super::$m::Reader<$lt>>> {
            self.table
                .table($index)
                .map(|table| table.map(super::$m::Reader::from_table))
        }
    };
    (@getter $lt:lifetime, $index:literal, $name:ident, $t:ident) => {
        #[doc = concat!("`", stringify!($name), "`, or its default when absent.")]
        ///
        /// # Errors
        ///
        /// Fails if the buffer is damaged.
        pub fn $name(&self) -> $crate::CodecResult<$t> {
            self.table.get::<$t>($index)
        }
    };

    (@read $this:ident, $name:ident, string) => {
        $this.$name()?.map(::std::string::ToString::to_string)
    };
    (@read $this:ident, $name:ident, vector <$t:ident>) => {
        $this.$name()?.map(|values| values.to_vec())
    };
    (@read $this:ident, $name:ident, table <$m:ident>) => {
        match $this.$name()? {
            ::core::option::Option::Some(nested) => {
                ::core::option::Option::Some(nested.to_record()?)
            }
            ::core::option::Option::None => ::core::option::Option::None,
        }
    };
    (@read $this:ident, $name:ident, $t:ident) => {
        $this.$name()?
    };

    (@add $b:ident, $r:ident, $index:literal, $name:ident, string) => {
        if let ::core::option::Option::Some(value) = &$r.$name {
            $b.add_string($index, value)?;
        }
    };
    (@add $b:ident, $r:ident, $index:literal, $name:ident, vector <$t:ident>) => {
        if let ::core::option::Option::Some(value) = &$r.$name {
            $b.add_vector::<$t>($index, value)?;
        }
    };
    (@add $b:ident, $r:ident, $index:literal, $name:ident, table <$m:ident>) => {
        if let ::core::option::Option::Some(value) = &$r.$name {
            let nested = super::$m::create($b, value)?;
            $b.add_reference($index, nested)?;
        }
    };
    (@add $b:ident, $r:ident, $index:literal, $name:ident, $t:ident) => {
        $b.add_scalar::<$t>($index, $r.$name)?;
    };

    (
        $(#[$meta:meta])*
        $vis:vis mod $module:ident {
            table $table:ident;
            $(identifier $ident:literal;)?
            $(id $id_field:ident;)?
            fields {
                $(
                    $(#[$flag:ident])*
                    $index:literal => $name:ident : $kind:ident $(<$arg:ident>)? $(= $default:expr)?
                ),* $(,)?
            }
        }
    ) => {
        $(#[$meta])*
        $vis mod $module {
            /// Buffer identifier written when this table is a root.
            pub const IDENTIFIER: ::core::option::Option<[u8; 4]> =
                $crate::define_table!(@identifier $($ident)?);

            /// Field indices.
            pub mod field {
                $(
                    #[allow(non_upper_case_globals)]
                    #[doc = concat!("Index of `", stringify!($name), "`.")]
                    pub const $name: u16 = $index;
                )*
            }

            static FIELDS: [$crate::FieldDef; $crate::define_table!(@count $($name)*)] = [
                $(
                    $crate::define_table!(@def $index, $name, $kind $(<$arg>)? $(= $default)?)
                        $(.$flag())*
                ),*
            ];

            /// Schema of this table.
            pub static SCHEMA: $crate::TableSchema = $crate::TableSchema {
                name: ::std::borrow::Cow::Borrowed(stringify!($table)),
                identifier: IDENTIFIER,
                fields: ::std::borrow::Cow::Borrowed(&FIELDS),
            };

            /// Owned form of the table.
            #[derive(Debug, Clone, PartialEq)]
            pub struct Record {
                $(
                    #[allow(missing_docs)]
                    pub $name: $crate::define_table!(@record_type $kind $(<$arg>)?),
                )*
            }

            impl ::core::default::Default for Record {
                fn default() -> Self {
                    Self {
                        $(
                            $name: $crate::define_table!(
                                @default_value $kind $(<$arg>)? $(= $default)?
                            ),
                        )*
                    }
                }
            }

            /// Zero-copy view of a table inside a buffer.
            #[derive(Debug, Clone, Copy)]
            pub struct Reader<'a> {
                table: $crate::Table<'a>,
            }

            impl<'a> Reader<'a> {
                /// Reads the root table of `buf`, checking the identifier.
                ///
                /// # Errors
                ///
                /// See [`root`]($crate::root).
                pub fn from_root(buf: &'a [u8]) -> $crate::CodecResult<Self> {
                    $crate::root(buf, &SCHEMA).map(Self::from_table)
                }

                /// Wraps a table read with this schema.
                #[must_use]
                pub fn from_table(table: $crate::Table<'a>) -> Self {
                    Self { table }
                }

                /// The underlying table view.
                #[must_use]
                pub fn as_table(&self) -> $crate::Table<'a> {
                    self.table
                }

                $(
                    $crate::define_table!(@getter 'a, $index, $name, $kind $(<$arg>)?);
                )*

                /// Copies every field into an owned record.
                ///
                /// # Errors
                ///
                /// Returns the first field read error.
                pub fn to_record(&self) -> $crate::CodecResult<Record> {
                    ::core::result::Result::Ok(Record {
                        $(
                            $name: $crate::define_table!(@read self, $name, $kind $(<$arg>)?),
                        )*
                    })
                }
            }

            /// Writes `record` as a table and returns a reference to it.
            ///
            /// On error the table is abandoned and the builder stays usable.
            ///
            /// # Errors
            ///
            /// See [`Builder::end_table`]($crate::Builder::end_table).
            pub fn create(
                builder: &mut $crate::Builder<'_>,
                record: &Record,
            ) -> $crate::CodecResult<$crate::Ref> {
                builder.start_table(&SCHEMA);
                let staged = (|| -> $crate::CodecResult<()> {
                    $(
                        $crate::define_table!(
                            @add builder, record, $index, $name, $kind $(<$arg>)?
                        );
                    )*
                    ::core::result::Result::Ok(())
                })();
                match staged {
                    ::core::result::Result::Ok(()) => builder.end_table(),
                    ::core::result::Result::Err(err) => {
                        builder.abandon_table();
                        ::core::result::Result::Err(err)
                    }
                }
            }

            /// Deep-copies `source` into `builder`.
            ///
            /// # Errors
            ///
            /// See [`Builder::clone_table`]($crate::Builder::clone_table).
            pub fn clone(
                builder: &mut $crate::Builder<'_>,
                source: Reader<'_>,
            ) -> $crate::CodecResult<$crate::Ref> {
                builder.clone_table(source.as_table())
            }

            impl $crate::TableRecord for Record {
                fn schema() -> &'static $crate::TableSchema {
                    &SCHEMA
                }

                fn build(
                    &self,
                    builder: &mut $crate::Builder<'_>,
                ) -> $crate::CodecResult<$crate::Ref> {
                    create(builder, self)
                }

                fn read(table: $crate::Table<'_>) -> $crate::CodecResult<Self> {
                    Reader::from_table(table).to_record()
                }
            }

            $(
                impl $crate::Entity for Record {
                    const ID_FIELD: u16 = field::$id_field;

                    fn entity_id(&self) -> u64 {
                        self.$id_field
                    }

                    fn set_entity_id(&mut self, id: u64) {
                        self.$id_field = id;
                    }
                }
            )?
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{Builder, CodecError, Entity, TableRecord};

    crate::define_table! {
        mod address {
            table Address;
            fields {
                0 => street: string,
                1 => number: u16,
            }
        }
    }

    crate::define_table! {
        mod person {
            table Person;
            identifier b"PRSN";
            id id;
            fields {
                0 => id: u64,
                1 => name: string,
                2 => age: u8 = 18,
                3 => home: table<address>,
                4 => scores: vector<f64>,
                #[deprecated]
                5 => legacy: i32,
                #[required]
                6 => email: string,
            }
        }
    }

    fn sample() -> person::Record {
        person::Record {
            id: 1,
            name: Some("Ada".into()),
            age: 36,
            home: Some(address::Record {
                street: Some("Main".into()),
                number: 12,
            }),
            scores: Some(vec![1.0, 2.5]),
            legacy: 0,
            email: Some("ada@example.org".into()),
        }
    }

    #[test]
    fn generated_schema() {
        assert_eq!(person::SCHEMA.name, "Person");
        assert_eq!(person::IDENTIFIER, Some(*b"PRSN"));
        assert_eq!(person::field::home, 3);
        assert!(person::SCHEMA.field(5).unwrap().deprecated);
        assert!(person::SCHEMA.field(6).unwrap().required);
        person::SCHEMA.validate().unwrap();
        assert_eq!(address::IDENTIFIER, None);
    }

    #[test]
    fn defaults_come_from_schema() {
        let record = person::Record::default();
        assert_eq!(record.age, 18);
        assert_eq!(record.name, None);
    }

    #[test]
    fn record_roundtrip() {
        let record = sample();
        let bytes = record.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], b"PRSN");
        assert_eq!(person::Record::from_bytes(&bytes).unwrap(), record);

        let reader = person::Reader::from_root(&bytes).unwrap();
        assert_eq!(reader.age().unwrap(), 36);
        let home = reader.home().unwrap().unwrap();
        assert_eq!(home.street().unwrap(), Some("Main"));
        assert_eq!(reader.scores().unwrap().unwrap().to_vec(), vec![1.0, 2.5]);
    }

    #[test]
    fn required_field_enforced() {
        let record = person::Record {
            email: None,
            ..sample()
        };
        assert!(matches!(
            record.to_bytes(),
            Err(CodecError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn deprecated_field_rejects_values() {
        let record = person::Record {
            legacy: 4,
            ..sample()
        };
        assert!(matches!(
            record.to_bytes(),
            Err(CodecError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn entity_id_accessors() {
        let mut record = sample();
        assert_eq!(person::Record::ID_FIELD, person::field::id);
        record.set_entity_id(77);
        assert_eq!(record.entity_id(), 77);
    }

    #[test]
    fn clone_into_another_buffer() {
        let bytes = sample().to_bytes().unwrap();
        let reader = person::Reader::from_root(&bytes).unwrap();

        let mut builder = Builder::new();
        let copy = person::clone(&mut builder, reader).unwrap();
        let again = person::clone(&mut builder, reader).unwrap();
        assert_eq!(copy, again);
        builder.finish_root(copy, &person::SCHEMA).unwrap();
        let cloned = person::Record::from_bytes(builder.finished_data()).unwrap();
        assert_eq!(cloned, sample());
    }
}
