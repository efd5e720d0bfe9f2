/// Invoke `$m!(..)` once per tuple arity from 1 to 26, naming the elements with capital letters.
///
/// The callback receives a comma separated identifier list, so it is usually written as
/// `($($name:ident),*) => { impl<$($name: Bound),*> Trait for ($($name,)*) { .. } }`.
#[macro_export]
macro_rules! all_tuples {
    ($m:ident) => {
        $crate::all_tuples!(@peel $m; A B C D E F G H I J K L M N O P Q R S T U V W X Y Z);
    };
    (@peel $m:ident;) => {};
    (@peel $m:ident; $head:ident $($tail:ident)*) => {
        $m!($head $(, $tail)*);
        $crate::all_tuples!(@peel $m; $($tail)*);
    };
}

#[cfg(test)]
mod tests {
    trait Arity {
        const ARITY: usize;
    }

    macro_rules! arity {
        ($($name:ident),*) => {
            impl<$($name),*> Arity for ($($name,)*) {
                const ARITY: usize = [$(stringify!($name)),*].len();
            }
        };
    }

    all_tuples!(arity);

    #[test]
    fn covers_every_arity_up_to_26() {
        // Then
        assert_eq!(<(u8,)>::ARITY, 1);
        assert_eq!(<(u8, u16, u32)>::ARITY, 3);
        assert_eq!(
            <(
                u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8,
                u8, u8, u8, u8, u8,
            )>::ARITY,
            26
        );
    }
}
