macro_rules! resource_states {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident($repr:ty);

        $(
            $(#[doc = $flag_doc:literal])*
            $flag_name:ident = $bit:expr,
        )+
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $ty($repr);

        impl $ty {
            $(
                $(#[doc = $flag_doc])*
                pub const $flag_name: Self = Self($bit);
            )*

            #[doc = concat!("Returns a `", stringify!($ty), "` with none of the flags set.")]
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            #[doc = concat!("Returns a `", stringify!($ty), "` with all of the flags set.")]
            #[inline]
            pub const fn all() -> Self {
                Self(Self::all_raw())
            }

            const fn all_raw() -> $repr {
                0
                $(
                    | $bit
                )*
            }

            /// Returns the raw bit representation of `self`.
            #[inline]
            pub const fn as_raw(self) -> $repr {
                self.0
            }

            /// Returns the number of flags set in `self`.
            #[inline]
            pub const fn count(self) -> u32 {
                self.0.count_ones()
            }

            /// Returns whether no flags are set in `self`.
            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns whether any flags are set in both `self` and `other`.
            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            /// Returns whether all flags in `other` are set in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns the union of `self` and `other`.
            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            /// Returns the intersection of `self` and `other`.
            #[inline]
            pub const fn intersection(self, other: Self) -> Self {
                Self(self.0 & other.0)
            }

            /// Returns `self` without the flags set in `other`.
            #[inline]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            /// Returns an iterator over the individual flags set in `self`, lowest bit first.
            #[inline]
            pub fn iter(self) -> impl Iterator<Item = Self> {
                let mut remaining = self.0;

                std::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }

                    let bit = remaining & remaining.wrapping_neg();
                    remaining &= !bit;

                    Some(Self(bit))
                })
            }
        }

        impl Default for $ty {
            #[inline]
            fn default() -> Self {
                Self::empty()
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                let mut written = false;

                $(
                    if self.intersects(Self::$flag_name) {
                        if written {
                            write!(f, " | ")?;
                        }

                        write!(f, stringify!($flag_name))?;
                        written = true;
                    }
                )*

                if !written {
                    write!(f, "UNKNOWN")?;
                }

                Ok(())
            }
        }

        impl std::ops::BitAnd for $ty {
            type Output = Self;

            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                self.intersection(rhs)
            }
        }

        impl std::ops::BitAndAssign for $ty {
            #[inline]
            fn bitand_assign(&mut self, rhs: Self) {
                *self = self.intersection(rhs);
            }
        }

        impl std::ops::BitOr for $ty {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $ty {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                *self = self.union(rhs);
            }
        }

        impl std::ops::Sub for $ty {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                self.difference(rhs)
            }
        }

        impl std::ops::SubAssign for $ty {
            #[inline]
            fn sub_assign(&mut self, rhs: Self) {
                *self = self.difference(rhs);
            }
        }
    };
}

resource_states! {
    /// The access/usage state of a resource, as seen by the hardware.
    ///
    /// The empty set is the sentinel [`UNKNOWN`] state, meaning that the state of the resource
    /// hasn't been tracked yet.
    ///
    /// [`UNKNOWN`]: Self::UNKNOWN
    ResourceStates(u32);

    COMMON = 1 << 0,
    CONSTANT_BUFFER = 1 << 1,
    VERTEX_BUFFER = 1 << 2,
    INDEX_BUFFER = 1 << 3,
    INDIRECT_ARGUMENT = 1 << 4,
    SHADER_RESOURCE = 1 << 5,
    UNORDERED_ACCESS = 1 << 6,
    RENDER_TARGET = 1 << 7,
    DEPTH_WRITE = 1 << 8,
    DEPTH_READ = 1 << 9,
    STREAM_OUT = 1 << 10,
    COPY_DEST = 1 << 11,
    COPY_SOURCE = 1 << 12,
    RESOLVE_DEST = 1 << 13,
    RESOLVE_SOURCE = 1 << 14,
    PRESENT = 1 << 15,
    ACCEL_STRUCT_READ = 1 << 16,
    ACCEL_STRUCT_WRITE = 1 << 17,
    ACCEL_STRUCT_BUILD_INPUT = 1 << 18,
    ACCEL_STRUCT_BUILD_BLAS = 1 << 19,
    SHADING_RATE_SURFACE = 1 << 20,
    OPACITY_MICROMAP_WRITE = 1 << 21,
    OPACITY_MICROMAP_BUILD_INPUT = 1 << 22,
}

impl ResourceStates {
    /// The state of a resource that isn't tracked yet.
    pub const UNKNOWN: Self = Self::empty();

    /// The states that determine the layout of a texture's contents.
    pub const TEXTURE_LAYOUT_STATES: Self = Self(
        Self::SHADER_RESOURCE.0
            | Self::UNORDERED_ACCESS.0
            | Self::RENDER_TARGET.0
            | Self::DEPTH_WRITE.0
            | Self::DEPTH_READ.0
            | Self::COPY_DEST.0
            | Self::COPY_SOURCE.0
            | Self::RESOLVE_DEST.0
            | Self::RESOLVE_SOURCE.0
            | Self::PRESENT.0
            | Self::SHADING_RATE_SURFACE.0,
    );

    /// Returns whether `self` is the [`UNKNOWN`](Self::UNKNOWN) sentinel.
    #[inline]
    pub const fn is_unknown(self) -> bool {
        self.is_empty()
    }

    /// Returns whether `self` includes unordered access, the only kind of access for which
    /// back-to-back uses in the same state still need a barrier between them.
    #[inline]
    pub const fn is_unordered_access(self) -> bool {
        self.contains(Self::UNORDERED_ACCESS)
    }

    /// Returns whether `self` includes a state that a texture can be transitioned into, which is
    /// one that determines the layout of its contents.
    #[inline]
    pub const fn constrains_texture_layout(self) -> bool {
        self.intersects(Self::TEXTURE_LAYOUT_STATES)
    }
}
