diesel::table! {
    post (board, num) {
        board -> Text,
        num -> BigInt,
        parent -> BigInt,
        timestamp -> BigInt,
        lasthit -> BigInt,
        ip -> Text,
        date -> Text,
        name -> Text,
        trip -> Text,
        email -> Text,
        subject -> Text,
        password -> Text,
        comment -> Text,
        image -> Text,
        size -> BigInt,
        md5 -> Text,
        width -> Integer,
        height -> Integer,
        thumbnail -> Text,
        tn_width -> Integer,
        tn_height -> Integer,
        lastedit -> Text,
        lastedit_ip -> Text,
        admin_post -> Bool,
        stickied -> Integer,
        locked -> Bool,
        backup -> Bool,
        timestampofarchival -> BigInt,
    }
}

diesel::table! {
    report (num) {
        num -> BigInt,
        board -> Text,
        reporter -> Text,
        offender -> Text,
        postnum -> BigInt,
        comment -> Text,
        timestamp -> BigInt,
        date -> Text,
        resolved -> Bool,
    }
}

diesel::allow_tables_to_appear_in_same_query!(post, report);
